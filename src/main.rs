fn main() {
    if let Err(err) = promptdeck::cli::main() {
        eprintln!("❌ {err}");
        std::process::exit(1);
    }
}
