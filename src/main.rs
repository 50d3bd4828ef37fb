use clap::Parser;

fn main() {
    let options = nearfeed::Options::parse();
    if let Err(err) = nearfeed::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}
