use anyhow::Result;
use clap::{Parser, Subcommand};
use client_core::MealListClient;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the current meal list.
    List,
    /// Compose a meal, submit it, then print the refreshed list.
    Add {
        #[arg(long)]
        name: String,
        /// Calories as typed; coerced to a base-10 integer on submit.
        #[arg(long)]
        calories: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let client = MealListClient::connect(args.server_url.clone()).await;

    if let Command::Add { name, calories } = &args.command {
        client.set_draft(name.clone(), calories.clone()).await;
        client.add_meal().await;
    }

    let meals = client.meals().await;
    if meals.is_empty() {
        println!("no meals recorded");
        return Ok(());
    }
    for meal in meals {
        println!(
            "#{:<4} {:<24} {:>6} kcal  {}",
            meal.id.0,
            meal.name,
            meal.calories,
            meal.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}
