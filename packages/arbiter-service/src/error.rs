use crate::trace::LlmRole;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Invalid configuration: {message}")]
	Configuration { message: String },
	#[error("Vector search failed: {message}")]
	UpstreamSearch { message: String },
	#[error("{role} model generation failed: {message}")]
	UpstreamGeneration { role: LlmRole, message: String },
}
