use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

pub const DEFAULT_DOC_DIR: &str = "target/generated-docs";

#[derive(Debug, Parser)]
#[command(
    name = "refdoc-augment",
    version,
    about = "Serve reference docs with a floating table of contents and site header, or inject/remove them in place.",
    after_help = "EXAMPLES:\n  refdoc-augment serve --port 4200\n  refdoc-augment enhance --doc-dir target/generated-docs\n  refdoc-augment revert --doc-dir target/generated-docs\n  refdoc-augment release-train 1.0.2.RELEASE"
)]
pub struct Cli {
    /// Config file (defaults to $REFDOC_AUGMENT_CONFIG or ~/.refdoc-augment/config.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Serve the docs, augmenting pages on the fly (default).
    #[command(alias = "server")]
    Serve(ServeArgs),
    /// Augment every page in place.
    #[command(alias = "install")]
    Enhance(DocDirArgs),
    /// Remove previously injected markup.
    Revert(DocDirArgs),
    /// Print the release train a project version belongs to.
    ReleaseTrain {
        #[arg(value_name = "VERSION")]
        version: String,
    },
    /// Write the default config template.
    InitConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct DocDirArgs {
    #[arg(short = 'd', long = "doc-dir", value_name = "PATH", default_value = DEFAULT_DOC_DIR)]
    pub doc_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub docs: DocDirArgs,

    #[arg(long, visible_alias = "bind", value_name = "IP:PORT")]
    pub addr: Option<SocketAddr>,

    #[arg(long)]
    pub port: Option<u16>,
}

impl Default for DocDirArgs {
    fn default() -> Self {
        Self {
            doc_dir: PathBuf::from(DEFAULT_DOC_DIR),
        }
    }
}

impl Cli {
    pub fn subcommand(&self) -> Command {
        self.command.clone().unwrap_or_else(|| {
            Command::Serve(ServeArgs {
                docs: DocDirArgs::default(),
                addr: None,
                port: None,
            })
        })
    }
}

/// `--port` overrides the port of `--addr`, which overrides the configured
/// address.
pub fn finalize_addr(addr: Option<SocketAddr>, port: Option<u16>, configured: SocketAddr) -> SocketAddr {
    let mut addr = addr.unwrap_or(configured);
    if let Some(p) = port {
        addr.set_port(p);
    }
    addr
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args.iter().copied()).expect("args should parse")
    }

    #[test]
    fn defaults_to_serve() {
        let cli = parse(&["refdoc-augment"]);
        assert_eq!(
            cli.subcommand(),
            Command::Serve(ServeArgs {
                docs: DocDirArgs::default(),
                addr: None,
                port: None,
            })
        );
    }

    #[test]
    fn parses_enhance_with_doc_dir_and_globals() {
        let cli = parse(&["refdoc-augment", "enhance", "-d", "site", "--config", "c.yaml", "-v"]);
        assert_eq!(
            cli.subcommand(),
            Command::Enhance(DocDirArgs {
                doc_dir: PathBuf::from("site")
            })
        );
        assert_eq!(cli.config, Some(PathBuf::from("c.yaml")));
        assert!(cli.verbose);
    }

    #[test]
    fn parses_release_train_version() {
        let cli = parse(&["refdoc-augment", "release-train", "1.0.2.RELEASE"]);
        assert_eq!(
            cli.subcommand(),
            Command::ReleaseTrain {
                version: "1.0.2.RELEASE".to_string()
            }
        );
    }

    #[test]
    fn rejects_bad_addresses() {
        assert!(Cli::try_parse_from(["refdoc-augment", "serve", "--addr", "nope"]).is_err());
    }

    #[test]
    fn port_overrides_address() {
        let configured: SocketAddr = "127.0.0.1:7878".parse().expect("addr");
        let addr: SocketAddr = "0.0.0.0:8000".parse().expect("addr");
        assert_eq!(finalize_addr(None, None, configured), configured);
        assert_eq!(finalize_addr(Some(addr), None, configured), addr);
        assert_eq!(
            finalize_addr(Some(addr), Some(9000), configured),
            "0.0.0.0:9000".parse::<SocketAddr>().expect("addr")
        );
    }
}
