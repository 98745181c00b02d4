use std::{
	ffi::OsString,
	path::{Path, PathBuf},
	time::Duration,
};

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::Log;

/// How `.m4s` segments are delivered to subscribers.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
	#[default]
	Stream,
	Datagram,
}

impl From<Mode> for moq_object::BroadcastMode {
	fn from(mode: Mode) -> Self {
		match mode {
			Mode::Stream => Self::Stream,
			Mode::Datagram => Self::Datagram,
		}
	}
}

#[derive(clap::Args, Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BroadcastArgs {
	/// Deliver segments over reliable streams or fragmented datagrams.
	#[arg(long = "mode", env = "MOQ_OBJECT_MODE", value_enum, default_value_t = Mode::Stream)]
	pub mode: Mode,

	/// The number of seconds each segment may be cached, or 0 for never.
	#[arg(long = "expires", env = "MOQ_OBJECT_EXPIRES", default_value_t = 30)]
	pub expires: u64,

	/// The maximum payload of each datagram slice, in bytes.
	#[arg(long = "slice-size", env = "MOQ_OBJECT_SLICE_SIZE", default_value_t = 1024)]
	pub slice_size: usize,
}

impl Default for BroadcastArgs {
	fn default() -> Self {
		Self {
			mode: Mode::Stream,
			expires: 30,
			slice_size: 1024,
		}
	}
}

impl BroadcastArgs {
	pub fn config(&self) -> moq_object::BroadcastConfig {
		moq_object::BroadcastConfig {
			mode: self.mode.into(),
			expires: self.expires,
			fragment: self.fragment(),
		}
	}

	pub fn fragment(&self) -> moq_object::FragmentConfig {
		moq_object::FragmentConfig {
			slice_size: self.slice_size,
		}
	}
}

#[derive(clap::Args, Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ReassemblyArgs {
	/// Close a group after this long without receiving a datagram.
	#[arg(long = "inactivity", env = "MOQ_OBJECT_INACTIVITY", value_parser = humantime::parse_duration, default_value = "2s")]
	#[serde(with = "humantime_serde")]
	pub inactivity: Duration,

	/// The number of recently closed groups to remember per track.
	#[arg(long = "tombstones", env = "MOQ_OBJECT_TOMBSTONES", default_value_t = 32)]
	pub tombstones: usize,
}

impl Default for ReassemblyArgs {
	fn default() -> Self {
		Self {
			inactivity: Duration::from_secs(2),
			tombstones: 32,
		}
	}
}

impl ReassemblyArgs {
	pub fn config(&self) -> moq_object::ReassemblyConfig {
		moq_object::ReassemblyConfig {
			inactivity: self.inactivity,
			tombstones: self.tombstones,
		}
	}
}

#[derive(clap::Args, Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TimelineArgs {
	/// The number of segments queued per media kind before the producer waits.
	#[arg(id = "timeline-capacity", long = "timeline-capacity", env = "MOQ_OBJECT_TIMELINE_CAPACITY", default_value_t = 100)]
	pub capacity: usize,
}

impl Default for TimelineArgs {
	fn default() -> Self {
		Self { capacity: 100 }
	}
}

impl TimelineArgs {
	pub fn config(&self) -> moq_object::TimelineConfig {
		moq_object::TimelineConfig {
			capacity: self.capacity,
		}
	}
}

/// Configuration from CLI flags and environment variables, or a TOML file.
#[derive(Parser, Clone, Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
	#[command(flatten)]
	pub log: Log,

	#[command(flatten)]
	pub broadcast: BroadcastArgs,

	#[command(flatten)]
	pub reassembly: ReassemblyArgs,

	#[command(flatten)]
	pub timeline: TimelineArgs,

	/// Load the configuration from this TOML file instead.
	#[arg(long = "config", env = "MOQ_OBJECT_CONFIG")]
	#[serde(skip)]
	pub file: Option<PathBuf>,
}

impl Config {
	/// Parse the process arguments, then load the TOML file if one was provided.
	pub fn load() -> anyhow::Result<Self> {
		Self::load_from(std::env::args_os())
	}

	pub fn load_from<I, T>(args: I) -> anyhow::Result<Self>
	where
		I: IntoIterator<Item = T>,
		T: Into<OsString> + Clone,
	{
		let config = Self::try_parse_from(args)?;

		match &config.file {
			Some(path) => Self::from_file(path),
			None => Ok(config),
		}
	}

	pub fn from_file(path: &Path) -> anyhow::Result<Self> {
		let contents =
			std::fs::read_to_string(path).with_context(|| format!("failed to read config: {}", path.display()))?;

		let mut config: Self =
			toml::from_str(&contents).with_context(|| format!("failed to parse config: {}", path.display()))?;
		config.file = Some(path.to_path_buf());

		tracing::debug!(path = %path.display(), "loaded config");

		Ok(config)
	}
}
