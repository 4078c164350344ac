use dotenv::dotenv;
use statement_import_core::llm::{GeminiClient, GeminiStructurer, DEFAULT_MODEL};
use statement_import_core::{ImportConfig, ImportEvent, StatementImporter, StructuringHints};
use std::error::Error;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::mpsc;

/// Usage: `cargo run --example import_statement --features gemini -- statement.txt [config.json]`
///
/// Expects text already extracted from the statement PDF.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    let api_key = std::env::var("GEMINI_API_KEY").expect("GEMINI_API_KEY must be set");

    let mut args = std::env::args().skip(1);
    let Some(text_path) = args.next().map(PathBuf::from) else {
        println!("Usage: import_statement <statement.txt> [config.json]");
        return Ok(());
    };
    let config = match args.next() {
        Some(path) => ImportConfig::from_path(path)?,
        None => ImportConfig::default(),
    };

    let text = fs::read_to_string(&text_path).await?;
    println!("📄 Importing {:?} ({} bytes)\n", text_path, text.len());

    let structurer = GeminiStructurer::new(GeminiClient::new(api_key), DEFAULT_MODEL)?;
    let importer = StatementImporter::new(structurer, config);

    let (tx, mut rx) = mpsc::channel(32);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ImportEvent::Chunked { chunks } => println!("✂️  Split into {} chunk(s)", chunks),
                ImportEvent::ChunkStarted { index, total } => {
                    println!("🤖 Structuring chunk {}/{}...", index + 1, total)
                }
                ImportEvent::Retry { attempt, error } => {
                    println!("🔁 Attempt {} failed: {}", attempt, error)
                }
                ImportEvent::Repairing { index } => println!("🩹 Repairing chunk {}", index + 1),
                ImportEvent::ChunkFinished {
                    index,
                    transactions,
                } => println!("   ✅ Chunk {}: {} transaction(s)", index + 1, transactions),
                ImportEvent::Rejected { reason } => println!("❌ {}", reason),
                _ => {}
            }
        }
    });

    let result = importer
        .import_text(&text, &StructuringHints::default(), Some(tx))
        .await;
    printer.await?;
    let result = result?;

    println!("\n📝 {}\n", result.parsing_notes);
    for txn in &result.transactions {
        println!(
            "{}  {:>12.2}  {:<6}  {:<18}  {}",
            txn.date, txn.amount, txn.direction, txn.category, txn.description
        );
    }

    println!("\n{}", serde_json::to_string_pretty(&result.metadata)?);
    Ok(())
}
