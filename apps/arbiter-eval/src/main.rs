use clap::Parser;

use arbiter_eval::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let report = arbiter_eval::run(Args::parse()).await?;

	println!("{report}");

	Ok(())
}
