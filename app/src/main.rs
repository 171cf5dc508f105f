use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "pantry")]
#[command(about = "AI-assisted ingestion of markdown recipes into structured JSON")]
struct Args {
    #[command(subcommand)]
    command: pantry_lib::cli::Command,
}

fn main() {
    let args = Args::parse();
    pantry_lib::run(args.command);
}
