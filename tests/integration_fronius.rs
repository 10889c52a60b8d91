//! Integration tests for the Fronius Solar API client.


use froniusd::integration::fronius::{Client, MeterLocation};
use mockserver_fronius::FroniusMockServer;
use rstest::*;

#[fixture]
async fn server() -> FroniusMockServer {
    FroniusMockServer::start().await
}

fn client(server: &FroniusMockServer) -> Client {
    Client::new(reqwest::Client::new(), server.url())
}

#[rstest]
#[tokio::test]
async fn test_probe_api_version_confirms_fronius(#[future] server: FroniusMockServer) {
    let server = server.await;
    let mock = server.mock_api_version().await;
    let client = client(&server);

    let confirmed = client.probe_api_version().await.unwrap();

    assert!(confirmed);
    mock.assert_async().await;
}

#[rstest]
#[tokio::test]
async fn test_probe_api_version_rejects_non_fronius(#[future] server: FroniusMockServer) {
    let server = server.await;
    let mock = server.mock_api_version_not_fronius().await;
    let client = client(&server);

    let confirmed = client.probe_api_version().await.unwrap();

    assert!(!confirmed);
    mock.assert_async().await;
}

#[rstest]
#[tokio::test]
async fn test_probe_api_version_transport_error(#[future] server: FroniusMockServer) {
    let server = server.await;
    let client = client(&server);
    // No mock registered: httpmock answers 404.
    let result = client.probe_api_version().await;
    assert!(result.is_err());
}

#[rstest]
#[tokio::test]
async fn test_get_power_flow_master(#[future] server: FroniusMockServer) {
    let server = server.await;
    let mock = server.mock_power_flow_master().await;
    let client = client(&server);

    let flow = client.get_power_flow().await.unwrap();

    assert_eq!(flow.p_pv, Some(3000.0));
    assert_eq!(flow.p_grid, Some(-500.0));
    assert_eq!(flow.p_akku, Some(0.0));
    assert_eq!(flow.p_load, Some(-2500.0));
    assert_eq!(flow.soc, Some(81.2));
    assert_eq!(flow.status_code, Some(7));
    mock.assert_async().await;
}

#[rstest]
#[tokio::test]
async fn test_get_power_flow_slave_has_no_load(#[future] server: FroniusMockServer) {
    let server = server.await;
    let mock = server.mock_power_flow_slave().await;
    let client = client(&server);

    let flow = client.get_power_flow().await.unwrap();

    assert_eq!(flow.p_pv, Some(1250.4));
    assert_eq!(flow.p_load, None);
    assert_eq!(flow.p_grid, None);
    assert_eq!(flow.soc, None);
    mock.assert_async().await;
}

#[rstest]
#[tokio::test]
async fn test_get_power_flow_fault_code(#[future] server: FroniusMockServer) {
    let server = server.await;
    let mock = server.mock_power_flow_faulted().await;
    let client = client(&server);

    let flow = client.get_power_flow().await.unwrap();

    assert_eq!(flow.status_code, Some(3));
    mock.assert_async().await;
}

#[rstest]
#[tokio::test]
async fn test_get_inverter_info(#[future] server: FroniusMockServer) {
    let server = server.await;
    let mock = server.mock_inverter_info().await;
    let client = client(&server);

    let info = client.get_inverter_info().await.unwrap();

    assert_eq!(info.unique_id.as_deref(), Some("29301000987654"));
    assert_eq!(info.model, "Gen24");
    assert_eq!(info.pv_power_w, Some(5000));
    assert_eq!(info.custom_name.as_deref(), Some("Garage roof"));
    mock.assert_async().await;
}

#[rstest]
#[tokio::test]
async fn test_get_storage(#[future] server: FroniusMockServer) {
    let server = server.await;
    let mock = server.mock_storage().await;
    let client = client(&server);

    let storage = client.get_storage().await.unwrap().unwrap();

    assert_eq!(storage.manufacturer.as_deref(), Some("BYD"));
    assert_eq!(storage.capacity_wh, Some(11520.0));
    assert!(storage.enabled);
    mock.assert_async().await;
}

#[rstest]
#[tokio::test]
async fn test_get_storage_absent(#[future] server: FroniusMockServer) {
    let server = server.await;
    let mock = server.mock_storage_absent().await;
    let client = client(&server);

    let storage = client.get_storage().await.unwrap();

    assert_eq!(storage, None);
    mock.assert_async().await;
}

#[rstest]
#[tokio::test]
async fn test_get_meter(#[future] server: FroniusMockServer) {
    let server = server.await;
    let mock = server.mock_meter().await;
    let client = client(&server);

    let meter = client.get_meter().await.unwrap().unwrap();

    assert_eq!(meter.manufacturer.as_deref(), Some("Fronius"));
    assert_eq!(meter.model.as_deref(), Some("Smart Meter TS 65A-3"));
    assert_eq!(meter.location, MeterLocation::Grid);
    assert!(meter.enabled);
    mock.assert_async().await;
}
