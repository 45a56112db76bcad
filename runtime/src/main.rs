use cw2::runtime::RuntimeConfig;
use cw2::{RecordingCanvas, Runtime, VERSION};
use std::env;
use std::process;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let path = match env::args().nth(1) {
        Some(path) => path,
        None => {
            eprintln!("cw2 v{}", VERSION);
            eprintln!("usage: cw2 <program.cw2c>");
            process::exit(2);
        }
    };

    let mut runtime = Runtime::with_config(
        RecordingCanvas::default(),
        RuntimeConfig::default().with_debug_mode(true),
    );

    if let Err(e) = runtime.execute_file(&path).await {
        eprintln!("Execution failed: {}", e);
        process::exit(1);
    }

    runtime.with_canvas(|canvas| {
        for call in canvas.drawing_calls() {
            println!("{}", call);
        }
    });
}
