// Copyright 2024 grist
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::Once;

use snafu::{ResultExt, Whatever};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INSTALL: Once = Once::new();

/// Initialize logging to stderr.
///
/// The level comes from `RUST_LOG` when it is set, otherwise from
/// `default_log_level`. Fails if a global subscriber is already installed.
pub fn init_logging(default_log_level: &str) -> Result<(), Whatever> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_log_level));

    let fmt_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .whatever_context("a global tracing subscriber is already installed")?;
    tracing::info!("logging started");
    Ok(())
}

/// Installs the fmt logger once per process. Tests call this first thing.
pub fn install_fmt_log() {
    INSTALL.call_once(|| {
        if let Err(e) = init_logging("info") {
            eprintln!("failed to install logger: {e}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_twice() {
        install_fmt_log();
        install_fmt_log();
        // a second global install is refused rather than panicking.
        assert!(init_logging("debug").is_err());
    }
}
