use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = remez_cli::Args::parse();

	remez_cli::run(args).await
}
