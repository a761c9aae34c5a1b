use std::error::Error;

use vergen_gitcl::{Cargo, Emitter, Gitcl};

fn main() -> Result<(), Box<dyn Error>> {
	// Feeds `VERGEN_GIT_SHA` and `VERGEN_CARGO_TARGET_TRIPLE` into `arbiter_cli::VERSION`.
	Emitter::default()
		.add_instructions(&Cargo::all_cargo())?
		.add_instructions(&Gitcl::all_git())?
		.emit()?;

	Ok(())
}
