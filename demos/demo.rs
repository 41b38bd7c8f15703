use rummikub_optimizer::{Meld, PlayOptimizer, TileCounts};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Rummikub Optimizer\n");

    // Board: a red run and a group of fives
    let melds = vec![Meld::from_string("r 4 5 6")?, Meld::from_string("5 b y k")?];
    let board = TileCounts::from_melds(&melds)?;

    // Rack: two tiles that fit somewhere, one wild, one stray
    let rack = TileCounts::parse("r7 r5 w b11")?;

    println!("Board:");
    for meld in &melds {
        println!("  {}", meld);
    }
    let rack_tiles: Vec<String> = rack.tiles().iter().map(|t| t.to_string()).collect();
    println!("Rack: {}", rack_tiles.join(" "));

    let optimizer = PlayOptimizer::new()?;
    let solution = optimizer.solve(&board, &rack)?;

    if solution.is_pass() {
        println!("\nNothing to play; draw a tile.");
        return Ok(());
    }

    println!("\nPlays {} tiles. New board:", solution.tiles_played());
    for chosen in &solution.sets {
        let meld = chosen.to_meld();
        for _ in 0..chosen.copies {
            print!("  {}", meld);
            if !chosen.wildcards.is_empty() {
                let roles: Vec<String> = chosen.wildcards.iter().map(|t| t.to_string()).collect();
                print!("  (wild as {})", roles.join(", "));
            }
            println!();
        }
    }

    let left: Vec<String> = rack
        .iter()
        .filter(|(tile, count)| solution.moved.get(*tile) < *count)
        .map(|(tile, _)| tile.to_string())
        .collect();
    let left = if left.is_empty() { "(nothing)".to_string() } else { left.join(" ") };
    println!("Left in rack: {}", left);
    Ok(())
}
