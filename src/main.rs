#[tokio::main]
async fn main() {
    if let Err(e) = coinrush_server::frameworks::server::run_with_config().await {
        tracing::error!(error = %e, "server exited");
    }
}
