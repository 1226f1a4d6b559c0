// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

//! Subcommand to validate a configuration file without starting the daemon.

use std::path::PathBuf;

use base::Error;
use bpaf::Bpaf;
use conf::{storage, ConfigRuntime, LoadOutcome};
use tracing::info;

/// Validate the configuration file and exit.
#[derive(Bpaf, Debug)]
#[bpaf(command("check"))]
pub struct Args {
    /// Path to the INI configuration file.
    #[bpaf(long("config"), argument("PATH"))]
    config: Option<PathBuf>,
}

pub fn run(args: Args) -> Result<i32, Error> {
    let path = super::config_path(args.config);
    let rt = ConfigRuntime::new();
    match storage::load(&path, &rt) {
        Ok(LoadOutcome::Clean) => {
            info!("{}: ok ({} users)", path.display(), rt.users().len());
            Ok(0)
        }
        Ok(LoadOutcome::DefaultsApplied) => {
            info!("{}: missing; defaults would apply", path.display());
            Ok(0)
        }
        Ok(LoadOutcome::Degraded) => {
            info!("{}: loads with errors (see warnings above)", path.display());
            Ok(1)
        }
        Err(e) => {
            info!("{}: unreadable: {}", path.display(), e);
            Ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn file_with(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("onvif.ini");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn clean_file_passes() {
        conf::testutil::init();
        let (_dir, path) = file_with("[imaging]\nbrightness = 60\n");
        let code = run(Args { config: Some(path) }).unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn invalid_value_fails() {
        conf::testutil::init();
        let (_dir, path) = file_with("[imaging]\nbrightness = 600\n");
        let code = run(Args { config: Some(path) }).unwrap();
        assert_eq!(code, 1);
    }
}
