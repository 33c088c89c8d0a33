use std::env;
use std::path::PathBuf;
use std::time::Duration;

use indicatif::{ProgressBar as Bar, ProgressStyle};
use voidx_cli::{bootstrap, ctrl_c_token, read_documents, split_list};
use voidx_core::progress::ProgressBar;
use voidx_hybrid::IndexOptions;

fn usage(prog: &str) -> ! {
    eprintln!(
        "Usage: {prog} <collection> <docs.jsonl> [--partition-key FIELD] [--partition NAME] \
         [--fields a,b]"
    );
    eprintln!("Example: {prog} kb_docs ../dev_data/docs.jsonl --partition-key creator_id");
    std::process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let prog = args[0].clone();
    let mut positional = Vec::new();
    let mut options = IndexOptions::default();
    let mut i = 1;
    while i < args.len() {
        let value = || args.get(i + 1).cloned().unwrap_or_else(|| usage(&prog));
        match args[i].as_str() {
            "--partition-key" => {
                options = options.with_partition_key(value());
                i += 1;
            }
            "--partition" => {
                options = options.with_partition(value());
                i += 1;
            }
            "--fields" => {
                options = options.with_indexing_fields(split_list(&value()));
                i += 1;
            }
            a if !a.starts_with('-') => positional.push(a.to_string()),
            other => eprintln!("ignoring unknown flag '{other}'"),
        }
        i += 1;
    }
    let [collection, path] = positional.as_slice() else { usage(&prog) };

    let app = bootstrap()?;
    let docs = read_documents(&PathBuf::from(path))?;
    println!("voidx indexer\n=============");
    println!("Collection: {collection}");
    println!("Documents: {} ({})", docs.len(), path);
    println!("Batch size: {}", app.config.store.batch_size);

    let token = ctrl_c_token();
    let store = app.manager.get_search_store(collection, &token).await?;

    let progress = ProgressBar::new(docs.len() as u64);
    let watch = progress.watch();
    let bar = Bar::new(docs.len() as u64);
    let template = "{spinner} [{bar:40}] {pos}/{len} ({percent}%) eta {msg}";
    bar.set_style(ProgressStyle::with_template(template)?.progress_chars("=> "));
    let ui = {
        let bar = bar.clone();
        tokio::spawn(async move {
            loop {
                let state = watch.state();
                bar.set_position(state.done);
                bar.set_message(format!("{}s", watch.get_progress().remaining_seconds));
                if watch.is_finished() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        })
    };

    let result = store.index(&docs, options.with_progress(progress.clone()), &token).await;
    ui.abort();
    bar.set_position(progress.state().done);
    match result {
        Ok(ids) => {
            bar.finish_with_message("done");
            println!("\n✅ Indexed {} documents into '{collection}'", ids.len());
            Ok(())
        }
        Err(aborted) => {
            bar.abandon_with_message("aborted");
            eprintln!("\n❌ Indexing stopped after {} documents", aborted.written_ids.len());
            if let Some(last) = aborted.written_ids.last() {
                eprintln!("   last committed id: {last}; resume from the next document");
            }
            Err(aborted.into())
        }
    }
}
