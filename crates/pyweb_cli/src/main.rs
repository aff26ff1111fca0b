use pyweb_core::{BridgeValue, ScriptOrigin};
use pyweb_engine::{Engine, EngineConfig, PageDom, ScriptState, ScriptUnit};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const USAGE: &str = "Usage: pyweb <run|exec|version> [--origin URL] [--muted] <args>";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut argv: Vec<String> = std::env::args().skip(1).collect();
    let Some(cmd) = argv.first().cloned() else {
        eprintln!("{USAGE}");
        std::process::exit(2);
    };
    argv.remove(0);

    let mut origin_url: Option<String> = None;
    let mut muted = false;
    let mut positional: Vec<String> = Vec::new();

    let mut i = 0;
    while i < argv.len() {
        let a = &argv[i];
        if a == "--origin" {
            i += 1;
            let Some(url) = argv.get(i) else {
                eprintln!("--origin requires a URL");
                std::process::exit(2);
            };
            origin_url = Some(url.clone());
        } else if a == "--muted" {
            muted = true;
        } else {
            positional.push(a.clone());
        }
        i += 1;
    }

    let origin = match &origin_url {
        Some(url) => ScriptOrigin::parse(url),
        None => ScriptOrigin::opaque(),
    };

    match cmd.as_str() {
        "run" => {
            if positional.len() != 1 {
                eprintln!("Missing <file>");
                std::process::exit(2);
            }
            let path = positional[0].as_str();
            let source = match std::fs::read_to_string(path) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("{path}: {e}");
                    std::process::exit(2);
                }
            };
            let engine = start_engine();
            engine.attach_dom(Box::new(PageDom::new()));

            let mut unit = match ScriptUnit::create_with_options(&source, path, origin, muted) {
                Ok(v) => v,
                Err(e) => {
                    eprintln!("{e}");
                    std::process::exit(2);
                }
            };
            if unit.state() == ScriptState::CompileFailed {
                if let Some(error) = unit.error() {
                    eprintln!("{error}");
                }
                std::process::exit(1);
            }
            match unit.run() {
                Ok(value) => {
                    if !value.is_null() {
                        println!("{}", render(&value));
                    }
                }
                Err(e) => {
                    eprintln!("{e}");
                    std::process::exit(1);
                }
            }
        }
        "exec" => {
            if positional.len() != 1 {
                eprintln!("Missing <source>");
                std::process::exit(2);
            }
            let engine = start_engine();
            engine.attach_dom(Box::new(PageDom::new()));
            match engine.eval(positional[0].as_str(), "<exec>", &origin) {
                Ok(value) => {
                    if !value.is_null() {
                        println!("{}", render(&value));
                    }
                }
                Err(e) => {
                    eprintln!("{e}");
                    std::process::exit(1);
                }
            }
        }
        "version" => {
            let engine = start_engine();
            println!("{}", engine.guest_version());
        }
        _ => {
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    }
}

fn start_engine() -> &'static Engine {
    if let Err(e) = Engine::initialize(EngineConfig::default()) {
        eprintln!("{e}");
        std::process::exit(2);
    }
    match Engine::handle() {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    }
}

/// Guest-flavored rendering of a bridged value for terminal output.
fn render(value: &BridgeValue) -> String {
    match value {
        BridgeValue::Null => "None".to_string(),
        BridgeValue::Bool(true) => "True".to_string(),
        BridgeValue::Bool(false) => "False".to_string(),
        BridgeValue::Int(i) => i.to_string(),
        BridgeValue::Float(f) => f.to_string(),
        BridgeValue::Str(s) => s.clone(),
        BridgeValue::Seq(items) => {
            let rendered: Vec<String> = items.iter().map(render_nested).collect();
            format!("[{}]", rendered.join(", "))
        }
        BridgeValue::Map(map) => {
            let rendered: Vec<String> = map
                .iter()
                .map(|(key, entry)| format!("'{key}': {}", render_nested(entry)))
                .collect();
            format!("{{{}}}", rendered.join(", "))
        }
        BridgeValue::Foreign(handle) => format!("<{} #{}>", handle.type_name(), handle.id()),
    }
}

fn render_nested(value: &BridgeValue) -> String {
    match value {
        BridgeValue::Str(s) => format!("'{s}'"),
        other => render(other),
    }
}
