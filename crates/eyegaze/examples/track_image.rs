use eyegaze::{load_frame, GazeConfig, GazeTracker, Region};
use std::error::Error;
use std::path::Path;

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: {} <image.png> <x,y,w,h> [config.json]", args[0]);
        std::process::exit(2);
    }

    let (frame, gray) = load_frame(Path::new(&args[1]))?;
    let eye_pair = Region::parse(&args[2]).ok_or("eye pair must be x,y,w,h")?;
    let config = match args.get(3) {
        Some(path) => GazeConfig::from_json_file(Path::new(path))?,
        None => GazeConfig::default(),
    };

    let mut tracker = GazeTracker::new(config);
    match tracker.track(&frame, &gray, Some(eye_pair)) {
        Some(out) => {
            for (i, eye) in out.eyes.iter().enumerate() {
                match eye.as_ref().and_then(|e| e.ellipse) {
                    Some(e) => println!(
                        "eye {i}: limbus at ({:.1}, {:.1}), {:.1}x{:.1} px @ {:.1} deg",
                        e.center[0], e.center[1], e.width, e.height, e.angle
                    ),
                    None => println!("eye {i}: no limbus"),
                }
            }
            match out.gaze {
                Some(g) => println!("gaze: ({:.1}, {:.1}) mm, ({:.0}, {:.0}) px", g.mm[0], g.mm[1], g.px[0], g.px[1]),
                None => println!("gaze: none"),
            }
        }
        None => println!("frame skipped"),
    }
    Ok(())
}
