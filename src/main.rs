//! spec-refine CLI entry point.

use clap::Parser;

use spec_refine::cli::commands::{export, init, refine, review, seed, status};
use spec_refine::cli::{handle_error, Cli, CliContext, Commands};
use spec_refine::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let ctx = match CliContext::load(cli.config.as_deref(), cli.json) {
        Ok(ctx) => ctx,
        Err(err) => handle_error(err, cli.json),
    };
    let _logger = match LoggerImpl::init(&ctx.config.logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Init(args) => init::execute(args, &ctx).await,
        Commands::Seed(args) => seed::execute(args, &ctx).await,
        Commands::Status(args) => status::status(args, &ctx).await,
        Commands::List(args) => status::list(args, &ctx).await,
        Commands::Log(args) => status::log(args, &ctx).await,
        Commands::Step(args) => refine::step(args, &ctx).await,
        Commands::Run(args) => refine::run(args, &ctx).await,
        Commands::Questions(args) => review::questions(args, &ctx).await,
        Commands::Answer(args) => review::answer(args, &ctx).await,
        Commands::More(args) => review::more(args, &ctx).await,
        Commands::Escalate(args) => review::escalate(args, &ctx).await,
        Commands::Approve(args) => review::approve(args, &ctx).await,
        Commands::Reset(args) => review::reset(args, &ctx).await,
        Commands::Export(args) => export::execute(args, &ctx).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
