use zabbix_provider::{serve, try_init_logging, ZabbixProvider};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    try_init_logging();
    serve(ZabbixProvider::new()).await
}
