mod cli;
mod pipeline;
mod retry;
#[cfg(test)]
mod testing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run().await
}
