// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::Parser;
use std::path::PathBuf;

use crate::config::Overrides;

#[derive(Parser, Debug)]
#[command(
    name = "jupyter-o2",
    version,
    about = "Launch Jupyter on an O2 interactive node and open it in your browser",
    long_about = "jupyter-o2 logs in to the O2 cluster, requests an interactive node from Slurm,\nstarts Jupyter there and forwards its port back to this machine through the login node.\nThe remote terminal stays attached; the program exits when Jupyter stops\n(or when you log out, with --keepalive).",
    after_help = "EXAMPLES:\n  Start a notebook server:         jupyter-o2 js123 notebook\n  JupyterLab with more resources:  jupyter-o2 js123 lab -m 8G -c 4 -t 0-8:00\n  Keep the shell after Jupyter:    jupyter-o2 js123 notebook --keepalive"
)]
pub struct Cli {
    #[arg(help = "O2 username")]
    pub user: String,

    #[arg(help = "Jupyter subcommand to run, e.g. notebook or lab")]
    pub subcommand: String,

    #[arg(short = 'p', long, help = "Port for Jupyter on both ends of the tunnel [default: 8887]")]
    pub port: Option<u16>,

    #[arg(short = 't', long, help = "Slurm time limit for the interactive job [default: 0-3:00]")]
    pub time: Option<String>,

    #[arg(short = 'm', long, help = "Memory to request from Slurm [default: 1G]")]
    pub mem: Option<String>,

    #[arg(
        short = 'c',
        short_alias = 'n',
        long,
        help = "Number of cores to request [default: 1]"
    )]
    pub cores: Option<u32>,

    #[arg(
        short = 'k',
        long,
        help = "Keep the interactive shell after Jupyter exits; quit by logging out"
    )]
    pub keepalive: bool,

    #[arg(long, help = "Login host [default: o2.hms.harvard.edu]")]
    pub host: Option<String>,

    #[arg(
        long,
        help = "Configuration file path [default: ~/.config/jupyter-o2/config.yaml]"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Do not open the Jupyter URL in a browser")]
    pub no_browser: bool,

    #[arg(long, help = "Do not request X11 forwarding")]
    pub no_x11: bool,

    #[arg(
        short = 'v',
        long,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv, -vvv)"
    )]
    pub verbose: u8,
}

impl Cli {
    /// Values that take precedence over the configuration file.
    pub fn overrides(&self) -> Overrides {
        Overrides {
            host: self.host.clone(),
            port: self.port,
            time: self.time.clone(),
            mem: self.mem.clone(),
            cores: self.cores,
            keepalive: self.keepalive,
            no_browser: self.no_browser,
            no_x11: self.no_x11,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_arguments() {
        let cli = Cli::try_parse_from(["jupyter-o2", "js123", "lab"]).unwrap();
        assert_eq!(cli.user, "js123");
        assert_eq!(cli.subcommand, "lab");
        assert_eq!(cli.overrides(), Overrides::default());
    }

    #[test]
    fn test_flags_map_to_overrides() {
        let cli = Cli::try_parse_from([
            "jupyter-o2", "js123", "notebook", "-p", "9999", "-t", "0-1:00", "-m", "2G", "-n",
            "4", "-k", "--no-browser", "-vv",
        ])
        .unwrap();
        let overrides = cli.overrides();
        assert_eq!(overrides.port, Some(9999));
        assert_eq!(overrides.time.as_deref(), Some("0-1:00"));
        assert_eq!(overrides.mem.as_deref(), Some("2G"));
        assert_eq!(overrides.cores, Some(4));
        assert!(overrides.keepalive);
        assert!(overrides.no_browser);
        assert!(!overrides.no_x11);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_missing_subcommand_is_a_usage_error() {
        assert!(Cli::try_parse_from(["jupyter-o2", "js123"]).is_err());
    }
}
