//! Provides application configuration options.
//!
//! Configuration options can be parsed from config files in TOML format and
//! overridden with `MESHROOM_`-prefixed environment variables.

pub mod audio_activity;
pub mod ice;
pub mod log;
pub mod media;
pub mod render;
pub mod room;

use std::env;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

#[doc(inline)]
pub use self::{
    audio_activity::AudioActivity,
    ice::{Ice, IceServer},
    log::Log,
    media::{Media, VideoOffPolicy},
    render::Render,
    room::Room,
};

/// CLI argument that is responsible for holding application configuration
/// file path.
static APP_CONF_PATH_CMD_ARG_NAME: &str = "--conf";

/// Environment variable that is responsible for holding application
/// configuration file path.
static APP_CONF_PATH_ENV_VAR_NAME: &str = "MESHROOM_CONF";

/// Holds application config.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Conf {
    /// Logging settings.
    pub log: Log,

    /// [ICE] servers settings.
    ///
    /// [ICE]: https://webrtcglossary.com/ice
    pub ice: Ice,

    /// Local media capture settings.
    pub media: Media,

    /// Room membership settings.
    pub room: Room,

    /// Settings of the bounded readiness check of rendered tracks.
    pub render: Render,

    /// Settings of the audio activity detection.
    pub audio_activity: AudioActivity,
}

impl Conf {
    /// Creates new [`Conf`] and applies values from such sources
    /// and in that order:
    /// - default values;
    /// - configuration file, the name of which is given as a command line
    ///   parameter or environment variable;
    /// - environment variables.
    ///
    /// # Errors
    ///
    /// Errors if parsing fails.
    pub fn parse() -> Result<Self, ConfigError> {
        let mut cfg = Config::new();

        if let Some(path) = get_conf_file_name(
            env::var(APP_CONF_PATH_ENV_VAR_NAME),
            env::args(),
        ) {
            let _ = cfg.merge(File::with_name(&path))?;
        }

        let _ = cfg.merge(
            Environment::with_prefix("MESHROOM").separator("__"),
        )?;

        cfg.try_into()
    }
}

/// Returns the path to a configuration file, if it's set via CLI `args`
/// or environment variable.
fn get_conf_file_name<T>(
    env_var: Result<String, env::VarError>,
    mut cmd_args: T,
) -> Option<String>
where
    T: Iterator<Item = String>,
{
    if let Ok(path) = env_var {
        if !path.is_empty() {
            return Some(path);
        }
    }
    let _ = cmd_args.find(|arg| arg == APP_CONF_PATH_CMD_ARG_NAME)?;
    cmd_args.next().filter(|path| !path.is_empty())
}

/// Parses [`Conf`] with the provided environment variables set, then removes
/// them.
#[cfg(test)]
#[macro_export]
macro_rules! overrided_by_env_conf {
    ($($env:expr => $value:expr),+ $(,)?) => {{
        $(std::env::set_var($env, $value);)+
        let conf = $crate::conf::Conf::parse().unwrap();
        $(std::env::remove_var($env);)+
        conf
    }};
}
