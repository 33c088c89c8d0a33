use std::env;
use std::path::PathBuf;

use voidx_cli::{bootstrap, ctrl_c_token, read_fields};
use voidx_hybrid::CreateRequest;

fn usage(prog: &str) -> ! {
    eprintln!("Usage: {prog} <command> [args...]");
    eprintln!("  create <collection> <fields.json> [--meta key=value]...");
    eprintln!("  drop <collection>");
    eprintln!("  delete <collection> <id>...");
    eprintln!("  status <collection>");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args: Vec<String> = env::args().collect();
    let prog = args.remove(0);
    if args.len() < 2 {
        usage(&prog);
    }
    let cmd = args.remove(0);
    let collection = args.remove(0);

    let app = bootstrap()?;
    let token = ctrl_c_token();
    match cmd.as_str() {
        "create" => {
            let Some(path) = args.first().filter(|a| !a.starts_with('-')) else { usage(&prog) };
            let mut req = CreateRequest::new(&collection, read_fields(&PathBuf::from(path))?);
            let mut i = 1;
            while i < args.len() {
                match args[i].as_str() {
                    "--meta" => {
                        let Some((k, v)) = args.get(i + 1).and_then(|kv| kv.split_once('=')) else {
                            eprintln!("Error: --meta requires key=value");
                            std::process::exit(1);
                        };
                        req = req.with_metadata(k, v);
                        i += 1;
                    }
                    other => eprintln!("ignoring unknown argument '{other}'"),
                }
                i += 1;
            }
            let loaded = app.manager.create(&req, &token).await?;
            if loaded {
                println!("✅ Collection '{collection}' is ready ({})", app.manager.get_type());
            } else {
                println!("⏳ Collection '{collection}' is not loaded yet; retry create later");
            }
        }
        "drop" => {
            app.manager.drop(&collection, &token).await?;
            println!("🗑️  Dropped '{collection}'");
        }
        "delete" => {
            let ids = args.iter().map(|a| a.parse::<i64>()).collect::<Result<Vec<_>, _>>()?;
            let store = app.manager.get_search_store(&collection, &token).await?;
            store.delete(&ids, &token).await?;
            println!("🗑️  Deleted {} id(s) from '{collection}'", ids.len());
        }
        "status" => match app.manager.get_search_store(&collection, &token).await {
            Ok(store) => {
                println!("Collection: {}", store.collection());
                println!("Hybrid: {}", store.is_hybrid());
                for f in store.fields().fields() {
                    let flags = [
                        (f.is_primary, "primary"),
                        (f.indexing, "indexed"),
                        (f.nullable, "nullable"),
                    ];
                    let flags = flags
                        .iter()
                        .filter(|(on, _)| *on)
                        .map(|(_, name)| *name)
                        .collect::<Vec<_>>()
                        .join(", ");
                    println!("  {:<20} {:?} {flags}", f.name, f.field_type);
                }
            }
            Err(e) => println!("Collection '{collection}' is not available: {e}"),
        },
        _ => usage(&prog),
    }
    Ok(())
}
