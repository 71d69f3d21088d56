use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "kdeck",
    version,
    about = "A live terminal dashboard for Kubernetes workloads."
)]
pub struct CliArgs {
    /// Refresh interval in milliseconds
    #[arg(long, default_value_t = 1_500)]
    pub refresh_ms: u64,

    /// Start in a specific namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Start with all namespaces selected
    #[arg(short = 'A', long, conflicts_with = "namespace")]
    pub all_namespaces: bool,

    /// tracing filter (for example: info,debug,trace)
    #[arg(long, default_value = "info")]
    pub log_filter: String,

    /// Write tracing output to this file instead of discarding it
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Settings file; defaults to $KDECK_CONFIG, ./kdeck.yaml or ~/.config/kdeck/config.yaml
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::CliArgs;
    use clap::Parser;

    #[test]
    fn defaults_match_dashboard_expectations() {
        let args = CliArgs::try_parse_from(["kdeck"]).expect("parse");
        assert_eq!(args.refresh_ms, 1_500);
        assert_eq!(args.log_filter, "info");
        assert!(args.namespace.is_none());
        assert!(!args.all_namespaces);
    }

    #[test]
    fn namespace_and_all_namespaces_conflict() {
        assert!(CliArgs::try_parse_from(["kdeck", "-n", "ns1", "-A"]).is_err());
        let args = CliArgs::try_parse_from(["kdeck", "-n", "ns1", "--config", "k.yaml"])
            .expect("parse");
        assert_eq!(args.namespace.as_deref(), Some("ns1"));
        assert!(args.config.is_some());
    }
}
