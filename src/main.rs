use labtrackd::api::{start_server, ServerConfig};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    let config = ServerConfig::from_env();
    start_server(config).await
}
