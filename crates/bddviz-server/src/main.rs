#![forbid(unsafe_code)]

use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use bddviz_dump::dddmp::ExportSettings;
use bddviz_dump::{SourceDump, VarNames};
use bddviz_server::config::{Cli, Command, ConvertArgs, ServeArgs};
use bddviz_server::router::AppState;
use bddviz_server::server;
use bddviz_server::store::DiagramStore;

// spell-checker:ignore dddmp

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn serve_main(args: ServeArgs) -> ExitCode {
    let store = match DiagramStore::open(&args.data) {
        Ok(store) => store,
        Err(err) => {
            error!(%err, "could not open diagram store");
            return ExitCode::FAILURE;
        }
    };
    let state = Arc::new(AppState {
        store,
        default_dialect: args.dialect,
    });

    let listener = match TcpListener::bind((args.host.as_str(), args.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(host = %args.host, port = args.port, %err, "could not bind");
            return ExitCode::FAILURE;
        }
    };
    info!("serving http://{}:{}", args.host, args.port);

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(%err, "could not listen for ctrl-c");
        }
    };
    if let Err(err) = server::serve(listener, Arc::clone(&state), shutdown).await {
        error!(%err, "server failed");
        return ExitCode::FAILURE;
    }
    match state.store.persist() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "could not write diagrams on shutdown");
            ExitCode::FAILURE
        }
    }
}

fn read_file(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(err) => {
            eprintln!("error: could not read '{}' ({err})", path.display());
            None
        }
    }
}

fn convert_main(args: ConvertArgs) -> ExitCode {
    let Some(data) = read_file(&args.input) else {
        return ExitCode::FAILURE;
    };
    let vars = match &args.vars {
        Some(path) => match read_file(path) {
            Some(text) => VarNames::parse(&text),
            None => return ExitCode::FAILURE,
        },
        None => None,
    };

    let dump = match SourceDump::parse(&data)
        .and_then(|source| args.dialect.read(&source, vars.as_ref()))
    {
        Ok(dump) => dump,
        Err(err) => {
            eprintln!("error: could not convert '{}' ({err})", args.input.display());
            return ExitCode::FAILURE;
        }
    };
    let settings = ExportSettings::default()
        .version(args.dddmp_version.into())
        .diagram_name(&args.dd_name);

    let res = match &args.output {
        Some(path) => fs::File::create(path).and_then(|file| {
            let mut writer = io::BufWriter::new(file);
            settings.export(&mut writer, &dump)?;
            writer.flush()
        }),
        None => {
            let mut stdout = io::stdout().lock();
            settings
                .export(&mut stdout, &dump)
                .and_then(|()| writeln!(stdout))
        }
    };
    if let Err(err) = res {
        eprintln!("error: could not write the DDDMP file ({err})");
        return ExitCode::FAILURE;
    }

    info!(
        input = %args.input.display(),
        nnodes = dump.nnodes(),
        nvars = dump.nvars(),
        dialect = %args.dialect,
        "converted"
    );
    ExitCode::SUCCESS
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    match cli.command {
        Command::Serve(args) => serve_main(args).await,
        Command::Convert(args) => convert_main(args),
    }
}
