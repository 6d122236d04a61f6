use anyhow::Result;

use rpg_vault_ratings::cli::Command;
use rpg_vault_ratings::{
    handle_add_item, handle_init, handle_recalculate, handle_refresh, handle_review, handle_top,
    interpret,
};

fn main() {
    setup_logging();
    parse_and_execute().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });
}

fn setup_logging() {
    sensible_env_logger::init!();
}

fn parse_and_execute() -> Result<()> {
    let command = interpret();
    execute_command(&command)
}

fn execute_command(command: &Command) -> Result<()> {
    match command {
        Command::Init => handle_init(),
        Command::AddItem { title, genre } => handle_add_item(title, genre),
        Command::Review {
            item,
            user,
            rating,
            text,
        } => handle_review(*item, *user, *rating, text.clone()),
        Command::Refresh { item } => handle_refresh(*item),
        Command::Recalculate => handle_recalculate(),
        Command::Top {
            genre,
            limit,
            offset,
        } => handle_top(genre.as_deref(), *limit, *offset),
    }
}
