pub(crate) use crate::commands::run;
use clap::{Parser, Subcommand};
use stitchwork_lib::config::ApiServerArgs;

#[derive(Parser, Debug)]
#[clap(
    name = "stitchwork-api-server",
    about = "Stitchwork API server",
    version,
    rename_all = "kebab-case"
)]
pub struct Opt {
    #[clap(subcommand)]
    command: ApiServer,
}

#[allow(clippy::large_enum_variant)]
#[derive(Debug, Subcommand)]
pub enum ApiServer {
    Run(ApiServerArgs),
}

pub async fn run_cli() -> anyhow::Result<()> {
    let opt = Opt::try_parse();

    match opt {
        Ok(opt) => match opt.command {
            ApiServer::Run(args) => run::exec(args).await,
        },
        Err(e) => {
            // Prints the error and exits.
            e.exit()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_parses_upstream_flags() {
        let opt = Opt::try_parse_from([
            "stitchwork-api-server",
            "run",
            "--upstream-url",
            "http://localhost:4000/graphql",
            "--graphql-api-port",
            "8080",
            "--eager-init",
        ])
        .unwrap();

        let ApiServer::Run(args) = opt.command;
        assert_eq!(args.upstream_url, "http://localhost:4000/graphql");
        assert_eq!(args.graphql_api_port, "8080");
        assert!(args.eager_init);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_run_command_rejects_unknown_log_level() {
        let result = Opt::try_parse_from([
            "stitchwork-api-server",
            "run",
            "--log-level",
            "loud",
        ]);
        assert!(result.is_err());
    }
}
