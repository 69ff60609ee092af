use clap::{App, Arg};
use std::path::Path;

use rayfield::handler::Handler;
use rayfield::trace::RenderParams;

pub fn main() {
    let matches = App::new("rayfield")
        .version("0.1.0")
        .about("Offline Monte-Carlo path tracer with an n-dimensional film")
        .arg(
            Arg::with_name("script")
                .required(true)
                .index(1)
                .help("JSON scene script"),
        )
        .arg(
            Arg::with_name("output")
                .long("--output")
                .takes_value(true)
                .default_value("output.png")
                .help("Output image path"),
        )
        .arg(
            Arg::with_name("samples")
                .long("--samples")
                .takes_value(true)
                .default_value("64")
                .help("Samples per pixel"),
        )
        .arg(
            Arg::with_name("bounces")
                .long("--bounces")
                .takes_value(true)
                .default_value("6")
                .help("Maximum surface events per path"),
        )
        .arg(
            Arg::with_name("camera")
                .long("--camera")
                .takes_value(true)
                .default_value("0")
                .help("Scene camera index"),
        )
        .arg(
            Arg::with_name("seed")
                .long("--seed")
                .takes_value(true)
                .default_value("0")
                .help("Base seed of the per-pixel RNGs"),
        )
        .arg(
            Arg::with_name("film")
                .long("--film")
                .takes_value(true)
                .help("Save the raw film to this path"),
        )
        .arg(
            Arg::with_name("merge")
                .long("--merge")
                .takes_value(true)
                .help("Merge a previously saved film before writing results"),
        )
        .arg(
            Arg::with_name("debug-trace")
                .long("--debug-trace")
                .takes_value(true)
                .help("Dump per-bounce records of flagged rays to this JSON file"),
        )
        .get_matches();

    let params = RenderParams {
        samples: clap::value_t!(matches.value_of("samples"), usize).unwrap_or_else(|e| e.exit()),
        max_level: clap::value_t!(matches.value_of("bounces"), usize).unwrap_or_else(|e| e.exit()),
        camera: clap::value_t!(matches.value_of("camera"), usize).unwrap_or_else(|e| e.exit()),
        seed: clap::value_t!(matches.value_of("seed"), u64).unwrap_or_else(|e| e.exit()),
        debug_trace: matches.is_present("debug-trace"),
        progress: true,
    };

    let script = Path::new(matches.value_of("script").unwrap());
    let output = Path::new(matches.value_of("output").unwrap());
    let film = matches.value_of("film").map(Path::new);
    let merge = matches.value_of("merge").map(Path::new);
    let debug_trace = matches.value_of("debug-trace").map(Path::new);

    println!("Loading scene from {}", script.display());
    let result = Handler::new(params)
        .set_script_path(script)
        .pre_check()
        .load_script()
        .render()
        .merge_film(merge)
        .save_film(film)
        .save_img(output)
        .save_debug_info(debug_trace)
        .finish();

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
