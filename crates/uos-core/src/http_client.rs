use reqwest::Client;
use std::time::Duration;

const DISABLE_SYSTEM_PROXY_ENV: &str = "UOS_DISABLE_SYSTEM_PROXY";

// Bounds each upstream request so a hung connection cannot wedge a worker.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn build_http_client() -> Client {
    let builder = Client::builder().timeout(REQUEST_TIMEOUT);

    let builder = if should_disable_system_proxy() {
        builder.no_proxy()
    } else {
        builder
    };

    builder.build().expect("Failed to build reqwest client")
}

fn should_disable_system_proxy() -> bool {
    if std::env::var_os(DISABLE_SYSTEM_PROXY_ENV).is_some() {
        return true;
    }

    cfg!(test)
}
