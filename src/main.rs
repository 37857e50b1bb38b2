//! Site Vitals 主程序入口

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    site_vitals::core::main().await
}
