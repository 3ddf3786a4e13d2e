mod cli;

use std::io::{self, Read};
use std::process::ExitCode;

use clap::Parser;
use clap::error::ErrorKind;
use gee_export::logging::init_logging;
use gee_export::{
    CancelToken, ExportError, Report, Session, Snippet, export_snippet, load_config,
};
use tracing::{debug, error, info};

use cli::Cli;

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            let message = e.to_string();
            let first = message.lines().next().unwrap_or("invalid arguments");
            return emit(&Report::failure(first.trim_start_matches("error: ")));
        }
    };

    init_logging(cli.verbose, cli.log_format);
    emit(&Report::from(run(&cli)))
}

fn run(cli: &Cli) -> Result<String, ExportError> {
    let config = load_config(cli.settings())?;
    info!(
        project = %config.project,
        bucket = %config.bucket,
        api = %config.api_url,
        "configuration loaded"
    );

    let session = Session::connect(&config)?;
    let snippet = read_snippet(cli)?;
    debug!(bindings = ?snippet.names().collect::<Vec<_>>(), "snippet parsed");

    let options = cli.export_options(&config.bucket);
    export_snippet(&session, snippet, &options, &CancelToken::new())
}

fn read_snippet(cli: &Cli) -> Result<Snippet, ExportError> {
    let code = match (&cli.snippet, &cli.snippet_file) {
        (Some(s), _) if s == "-" => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| ExportError::Execution(format!("failed to read stdin: {}", e)))?;
            buf
        }
        (Some(s), _) => s.clone(),
        (None, Some(path)) => read_file(path)?,
        (None, None) => return Err(ExportError::Execution("no snippet provided".to_string())),
    };

    match &cli.template {
        Some(path) => Snippet::from_template(&read_file(path)?, &code),
        None => Snippet::parse(&code),
    }
}

fn read_file(path: &std::path::Path) -> Result<String, ExportError> {
    std::fs::read_to_string(path).map_err(|e| {
        ExportError::Execution(format!("failed to read {}: {}", path.display(), e))
    })
}

fn emit(report: &Report) -> ExitCode {
    let stdout = io::stdout();
    if let Err(e) = report.write_to(&mut stdout.lock()) {
        error!(error = %e, "failed to write result");
        return ExitCode::FAILURE;
    }
    report.exit_code()
}
