fn main() {
    if let Err(e) = realm_watcher::run() {
        eprintln!("realm-watcher: {}", e);
        std::process::exit(1);
    }
}
