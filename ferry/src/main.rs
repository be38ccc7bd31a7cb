use ferry_config::FerryConfig;
use ferry_core::master::Master;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = FerryConfig::from_file_or_default("ferry.conf");
    utils::init_tracing(&cfg.global.log_level);
    cfg.print();

    let master = Master::new(cfg);
    master.run().await
}
