#[tokio::main]
async fn main() {
    if let Err(e) = shinrai::provider::main().await {
        tracing::error!(error = %e, "shinraid exited");
        std::process::exit(1);
    }
}
