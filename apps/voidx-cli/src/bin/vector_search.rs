use std::env;

use voidx_cli::{bootstrap, ctrl_c_token, split_list};
use voidx_hybrid::{Filter, MultiMatch, RetrieveOptions};

fn usage(prog: &str) -> ! {
    eprintln!(
        "Usage: {prog} <collection> <query> [k] [--limit N] [--threshold X] [--filter JSON] \
         [--partitions a,b] [--partition-key FIELD] [--fields a,b]"
    );
    eprintln!(
        "Example: {prog} kb_docs 'survival skills' --limit 5 \
         --filter '{{\"op\":\"eq\",\"field\":\"creator_id\",\"value\":10}}'"
    );
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let prog = args[0].clone();
    let mut positional = Vec::new();
    let mut options = RetrieveOptions::top_k(10);
    let mut i = 1;
    while i < args.len() {
        let value = || args.get(i + 1).cloned().unwrap_or_else(|| usage(&prog));
        match args[i].as_str() {
            "--limit" => {
                let Ok(k) = value().parse::<usize>() else {
                    eprintln!("Error: --limit requires a number");
                    std::process::exit(1);
                };
                options.top_k = k;
                i += 1;
            }
            "--threshold" => {
                let Ok(t) = value().parse::<f32>() else {
                    eprintln!("Error: --threshold requires a number");
                    std::process::exit(1);
                };
                options = options.with_threshold(t);
                i += 1;
            }
            "--filter" => {
                let filter: Filter = serde_json::from_str(&value())?;
                options = options.with_filter(filter);
                i += 1;
            }
            "--partitions" => {
                options = options.with_partitions(split_list(&value()));
                i += 1;
            }
            "--partition-key" => {
                options = options.with_partition_key(value());
                i += 1;
            }
            "--fields" => {
                let fields = split_list(&value());
                options = options.with_multi_match(MultiMatch { fields, query: None });
                i += 1;
            }
            a if !a.starts_with('-') => positional.push(a.to_string()),
            other => eprintln!("ignoring unknown flag '{other}'"),
        }
        i += 1;
    }
    let (collection, query) = match positional.as_slice() {
        [collection, query] => (collection, query),
        [collection, query, k] => {
            let Ok(k) = k.parse::<usize>() else { usage(&prog) };
            options.top_k = k;
            (collection, query)
        }
        _ => usage(&prog),
    };

    let app = bootstrap()?;
    let token = ctrl_c_token();
    println!("🔍 voidx-search\n===============");
    println!("Query: {query}");
    println!("Collection: {collection}");
    let store = app.manager.get_search_store(collection, &token).await?;
    let results = store.retrieve(query, &options, &token).await?;

    println!("\n🔍 Found {} results for: \"{query}\"", results.len());
    for (n, hit) in results.iter().enumerate() {
        let (rank, field) = (n + 1, &hit.matched_field);
        println!("\n  {rank}. score={:.4}  id={}  field={field}", hit.score, hit.id);
        for (name, value) in &hit.fields {
            println!("     {name}: {value}");
        }
    }
    Ok(())
}
