fn main() {
    if let Err(err) = svnbridge::cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
