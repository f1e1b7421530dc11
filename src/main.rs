//! folio-cms binary entry point

#[tokio::main]
async fn main() {
    folio_cms::run().await;
}
