use clap::Parser;
use video_sprite_cli::cli::Cli;
use video_sprite_cli::pipeline::run;

fn main() {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = cli.pipeline_config();

    match run(&config) {
        Ok(stats) => {
            println!("Pipeline complete: {} frames", stats.final_frame_count);
            println!(
                "  spritesheet: {} ({}x{}, {} columns of {}x{})",
                stats.spritesheet.display(),
                stats.spritesheet_width,
                stats.spritesheet_height,
                stats.final_frame_count,
                stats.frame_width,
                stats.frame_height
            );
            match (&stats.gif, &stats.gif_error) {
                (Some(gif), _) => {
                    println!("  gif: {} ({} frames)", gif.display(), stats.gif_frames)
                }
                (None, Some(err)) => println!("  gif: not created ({err})"),
                (None, None) => {}
            }
            for (step, skipped) in stats.skipped.iter().filter(|(_, s)| !s.is_empty()) {
                println!("  {} skipped frames: {skipped:?}", step.name());
            }
        }
        Err(err) => {
            eprintln!("error ({}): {err}", err.kind());
            std::process::exit(1);
        }
    }
}
