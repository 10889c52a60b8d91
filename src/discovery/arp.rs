//! ARP-cache plumbing: interface enumeration, the host sweep that primes
//! the kernel cache, and ARP table parsing for every supported platform.

use super::error::{Error, Result};
use regex::Regex;
use std::net::Ipv4Addr;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::net::TcpStream;

/// Per-host "ping": a TCP connect attempt to port 80. Any SYN forces kernel
/// ARP resolution, and Fronius devices answer on 80 anyway.
const PING_TIMEOUT: Duration = Duration::from_secs(1);
const PING_PORT: u16 = 80;

/// One parsed ARP table row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    /// Normalized `aa:bb:cc:dd:ee:ff`.
    pub mac: String,
    pub hostname: Option<String>,
}

// Linux `arp -n`: "192.168.1.166  ether  04:cf:8c:9d:1e:2f  C  eth0"
static LINUX_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(\d{1,3}(?:\.\d{1,3}){3})\s+\S+\s+([0-9A-Fa-f]{1,2}(?::[0-9A-Fa-f]{1,2}){5})\s")
        .expect("cannot compile linux arp regex")
});

// macOS `arp -a`: "router.lan (192.168.1.1) at 4:cf:8c:9d:1e:2f on en0 ..."
static BSD_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(\S+) \((\d{1,3}(?:\.\d{1,3}){3})\) at ([0-9A-Fa-f]{1,2}(?::[0-9A-Fa-f]{1,2}){5})\b")
        .expect("cannot compile bsd arp regex")
});

// Windows `arp -a`: "  192.168.1.1      aa-bb-cc-dd-ee-ff     dynamic"
static WINDOWS_ROW: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(\d{1,3}(?:\.\d{1,3}){3})\s+([0-9A-Fa-f]{2}(?:-[0-9A-Fa-f]{2}){5})\s")
        .expect("cannot compile windows arp regex")
});

static INET_ADDR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"inet (?:addr:)?(\d{1,3}(?:\.\d{1,3}){3})")
        .expect("cannot compile inet regex")
});

/// Enumerates non-loopback IPv4 interface addresses by shelling out the
/// same way the ARP table is read.
pub async fn local_ipv4_addresses() -> Vec<Ipv4Addr> {
    let text = if cfg!(target_os = "linux") {
        command_output("ip", &["-4", "-o", "addr", "show"]).await
    } else {
        command_output("ifconfig", &[]).await
    };
    match text {
        Ok(text) => parse_interface_output(&text),
        Err(error) => {
            log::warn!("Cannot enumerate interfaces: {error}");
            Vec::new()
        }
    }
}

pub fn parse_interface_output(text: &str) -> Vec<Ipv4Addr> {
    let mut addresses = Vec::new();
    for captures in INET_ADDR.captures_iter(text) {
        let Ok(address) = captures[1].parse::<Ipv4Addr>() else {
            continue;
        };
        if address.is_loopback() || address.is_link_local() {
            continue;
        }
        if !addresses.contains(&address) {
            addresses.push(address);
        }
    }
    addresses
}

/// Connect-attempts every host of the /24 around `address` to prime the
/// kernel ARP cache. Failures are the expected case and are ignored.
pub async fn prime_subnet(address: Ipv4Addr) {
    let attempts = subnet_hosts(address).into_iter().map(|host| async move {
        let _ = tokio::time::timeout(PING_TIMEOUT, TcpStream::connect((host, PING_PORT))).await;
    });
    futures::future::join_all(attempts).await;
}

/// All other hosts 1..=254 of the /24 the address sits in.
pub fn subnet_hosts(address: Ipv4Addr) -> Vec<Ipv4Addr> {
    let [a, b, c, own] = address.octets();
    (1..=254)
        .filter(|host| *host != own)
        .map(|host| Ipv4Addr::new(a, b, c, host))
        .collect()
}

/// Reads and parses the platform's ARP table.
pub async fn read_arp_table() -> Result<Vec<ArpEntry>> {
    let text = if cfg!(target_os = "linux") {
        command_output("arp", &["-n"]).await?
    } else {
        command_output("arp", &["-a"]).await?
    };
    Ok(parse_arp_output(&text))
}

/// Parses ARP output in any of the three supported formats, normalizing
/// MACs and dropping broadcast/incomplete rows.
pub fn parse_arp_output(text: &str) -> Vec<ArpEntry> {
    let mut entries: Vec<ArpEntry> = Vec::new();
    let mut push = |ip: &str, mac: &str, hostname: Option<&str>| {
        let Ok(ip) = ip.parse::<Ipv4Addr>() else {
            return;
        };
        let Some(mac) = normalize_mac(mac) else {
            return;
        };
        if mac == "ff:ff:ff:ff:ff:ff" || entries.iter().any(|entry| entry.ip == ip) {
            return;
        }
        entries.push(ArpEntry {
            ip,
            mac,
            hostname: hostname
                .filter(|name| *name != "?" && !name.is_empty())
                .map(str::to_string),
        });
    };

    for captures in LINUX_ROW.captures_iter(text) {
        push(&captures[1], &captures[2], None);
    }
    for captures in BSD_ROW.captures_iter(text) {
        push(&captures[2], &captures[3], Some(&captures[1]));
    }
    for captures in WINDOWS_ROW.captures_iter(text) {
        push(&captures[1], &captures[2], None);
    }
    entries
}

/// Normalizes a MAC to lowercase `aa:bb:cc:dd:ee:ff`. Accepts `:` or `-`
/// separators and single-digit octets.
pub fn normalize_mac(raw: &str) -> Option<String> {
    let parts: Vec<&str> = raw.split([':', '-']).collect();
    if parts.len() != 6 {
        return None;
    }
    let mut octets = Vec::with_capacity(6);
    for part in parts {
        if part.is_empty() || part.len() > 2 || !part.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        octets.push(format!("{:02x}", u8::from_str_radix(part, 16).ok()?));
    }
    Some(octets.join(":"))
}

async fn command_output(program: &str, args: &[&str]) -> Result<String> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|source| Error::CommandFailed {
            command: format!("{program} {}", args.join(" ")),
            source,
        })?;
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
