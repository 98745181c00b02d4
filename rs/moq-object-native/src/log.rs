use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use tracing::Level;
use tracing_subscriber::{EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Tracing subscriber configuration.
#[serde_as]
#[derive(clap::Args, Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Log {
	/// The level filter to use, unless overridden by RUST_LOG.
	#[serde_as(as = "DisplayFromStr")]
	#[arg(id = "log-level", long = "log-level", default_value = "info", env = "MOQ_LOG_LEVEL")]
	pub level: Level,
}

impl Default for Log {
	fn default() -> Self {
		Self { level: Level::INFO }
	}
}

impl Log {
	pub fn new(level: Level) -> Self {
		Self { level }
	}

	pub fn level(&self) -> LevelFilter {
		LevelFilter::from_level(self.level)
	}

	/// The configured level, with any RUST_LOG directives layered on top.
	pub fn filter(&self) -> EnvFilter {
		EnvFilter::builder()
			.with_default_directive(self.level().into())
			.from_env_lossy()
	}

	/// Install a global subscriber that writes to stderr.
	///
	/// Errors if a global subscriber has already been installed.
	pub fn init(&self) -> anyhow::Result<()> {
		let layer = tracing_subscriber::fmt::layer()
			.with_writer(std::io::stderr)
			.with_filter(self.filter());

		tracing_subscriber::registry().with(layer).try_init()?;

		Ok(())
	}
}
