use loco_rs::cli;
use migration::Migrator;
use voucher_claim_backend::app::App;

#[tokio::main]
async fn main() -> loco_rs::Result<()> {
    Ok(cli::main::<App, Migrator>().await?)
}
