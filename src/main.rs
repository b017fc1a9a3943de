fn main() {
    if let Err(err) = tabular_insight::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
