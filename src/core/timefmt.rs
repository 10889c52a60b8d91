//! Local timestamp formatting shared by every external surface.
//!
//! All dates leaving the process use the same local-with-offset shape,
//! `YYYY-MM-DDTHH:MM:SS±HH:MM`.

use chrono::{DateTime, Local, SecondsFormat};

/// Formats a timestamp the way every JSON surface encodes dates.
pub fn format_local(at: &DateTime<Local>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Serde adapter for `DateTime<Local>` fields.
pub mod serde_local {
    use super::*;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(at: &DateTime<Local>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_local(at))
    }
}
