#[tokio::main]
async fn main() {
    if let Err(err) = ncf_api::run().await {
        tracing::error!(error = %err, "ncf-api failed");
        std::process::exit(1);
    }
}
