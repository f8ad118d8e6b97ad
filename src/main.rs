fn main() {
    if let Err(err) = kicad_wiring::cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
