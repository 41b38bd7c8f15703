//! Command-line front end: one board, one rack, one answer.

use clap::Parser;
use flexi_logger::Logger;
use rummikub_optimizer::{Meld, PlayOptimizer, SolveOptions, TileCounts};
use std::error::Error;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rummikub-optimizer")]
#[command(about = "Find the play that moves the most tiles out of a Rummikub rack")]
struct Args {
    /// Board meld, e.g. "r 4 5 6" (run) or "5 r b k" (group); repeat per meld
    #[arg(short, long = "meld")]
    melds: Vec<String>,

    /// Rack tiles, e.g. "r1 r2 w"
    #[arg(short, long, default_value = "")]
    rack: String,

    /// Look for a first meld from the rack alone instead of a normal turn
    #[arg(long, default_value_t = false)]
    initial: bool,

    /// JSON file with solve options
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the engine time limit in milliseconds
    #[arg(long)]
    time_limit_ms: Option<u64>,

    /// Print the result as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    Logger::try_with_env_or_str("info")?
        .format(flexi_logger::colored_default_format)
        .start()?;

    let args = Args::parse();

    let mut options = match &args.config {
        Some(path) => SolveOptions::from_json(&std::fs::read_to_string(path)?)?,
        None => SolveOptions::default(),
    };
    if let Some(ms) = args.time_limit_ms {
        options.time_limit_ms = ms;
    }

    let melds = args
        .melds
        .iter()
        .map(|m| Meld::from_string(m))
        .collect::<Result<Vec<_>, String>>()?;
    let board = TileCounts::from_melds(&melds)?;
    let rack = TileCounts::parse(&args.rack)?;
    log::info!(
        "board: {} tiles in {} melds, rack: {} tiles",
        board.total(),
        melds.len(),
        rack.total()
    );

    let optimizer = PlayOptimizer::new()?.with_options(options);

    if args.initial {
        let meld = optimizer.solve_initial_meld(&rack)?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&meld)?);
            return Ok(());
        }
        match meld {
            Some(meld) => {
                println!("Initial meld worth {} points:", meld.points);
                for chosen in &meld.sets {
                    for _ in 0..chosen.copies {
                        println!("  {}", chosen.to_meld());
                    }
                }
            }
            None => println!(
                "No initial meld reaches {} points: draw a tile",
                optimizer.options().initial_meld_points
            ),
        }
        return Ok(());
    }

    let solution = optimizer.solve_or_pass(&board, &rack)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&solution)?);
        return Ok(());
    }
    match solution {
        Some(solution) => {
            let moved: Vec<String> = solution.moved.tiles().iter().map(|t| t.to_string()).collect();
            println!("Play {} tiles: {}", solution.tiles_played(), moved.join(" "));
            println!("Score: {:.3}", solution.score());
            println!("New board:");
            for meld in solution.melds() {
                println!("  {}", meld);
            }
        }
        None => println!("No play: draw a tile"),
    }
    Ok(())
}
