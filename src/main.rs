use clap::Parser;
use sebal_batch::cli;

fn main() {
    let args = match cli::Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // clap exits with 2 on usage errors; 2 is reserved for failed jobs
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    match cli::dispatch(args) {
        Ok(outcome) => std::process::exit(outcome.exit_code()),
        Err(err) => {
            eprintln!("sebal-batch: {:#}", err);
            std::process::exit(1);
        }
    }
}
