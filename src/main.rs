use std::path::Path;

use tapas::session::Session;

pub fn main() {
    let path = std::env::args_os().nth(1).expect("Usage: tapas <path>");
    let path = Path::new(&path);

    let mut session = Session::new(vec![path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf()]);

    let result = if path.extension().and_then(|e| e.to_str()) == Some("tapc") {
        session.run_artifact(path)
    } else {
        session.run_file(path)
    };

    if let Err(error) = result {
        eprintln!("{}", error);
        std::process::exit(1);
    }
}
