use std::error::Error;
use std::time::Duration;
use tracing::info;
use fdfs::{Client, Config};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let tracker = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:22122".to_string());
    info!("Connecting to tracker {}...", tracker);

    let config = Config::new([tracker]).with_connect_timeout(Duration::from_secs(5));
    let client = Client::new(config).await?;

    // Upload a small buffer
    let message = b"Hello from the fdfs client!".to_vec();
    let file_id = client.upload_buffer(message.clone(), "txt").await?;
    info!("Uploaded buffer as {}", file_id);

    // Read it back, whole and in part
    let data = client.download_file(&file_id).await?;
    info!("Downloaded {} bytes: {}", data.len(), String::from_utf8_lossy(&data));
    assert_eq!(data, message);

    let head = client.download_to_buffer(&file_id, 0, 5).await?;
    info!("First five bytes: {}", String::from_utf8_lossy(&head));

    let local = std::env::temp_dir().join("fdfs-demo.txt");
    let written = client.download_to_file(&file_id, &local, 0, 0).await?;
    info!("Wrote {} bytes to {}", written, local.display());

    // Clean up
    client.delete_file(&file_id).await?;
    info!("Deleted {}", file_id);

    client.close().await;
    info!("Demo completed successfully!");
    Ok(())
}
