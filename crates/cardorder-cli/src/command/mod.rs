use clap::{Parser, Subcommand};

use self::{
    card_orders::CardOrdersArg, compare_orders::CompareOrdersArg, jacobian::JacobianArg,
    summarize::SummarizeArg,
};

mod card_orders;
mod compare_orders;
mod jacobian;
mod summarize;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Count inversions between the real and predicted card orders of every elite
    CompareOrders(#[clap(flatten)] CompareOrdersArg),
    /// Dump the simulation-based card orders of every elite
    CardOrders(#[clap(flatten)] CardOrdersArg),
    /// Print the surrogate fitness gradient of the cards in each elite deck
    Jacobian(#[clap(flatten)] JacobianArg),
    /// Summarize one or more inversion reports
    Summarize(#[clap(flatten)] SummarizeArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::CompareOrders(arg) => compare_orders::run(&arg)?,
        Mode::CardOrders(arg) => card_orders::run(&arg)?,
        Mode::Jacobian(arg) => jacobian::run(&arg)?,
        Mode::Summarize(arg) => summarize::run(&arg)?,
    }
    Ok(())
}
