use anyhow::Result;

use crate::config::Config;
use crate::knowledge::KnowledgeIndex;

/// `rep sources`: list knowledge documents and how many snippets each
/// contributes to the index.
pub fn list_sources(config: &Config) -> Result<()> {
    let root = &config.knowledge.root;
    if !root.exists() {
        println!("Knowledge root {} does not exist.", root.display());
        return Ok(());
    }

    let index = KnowledgeIndex::load(&config.knowledge);
    if index.documents().is_empty() {
        println!("No knowledge documents found under {}.", root.display());
        return Ok(());
    }

    println!("{:<32} SNIPPETS", "DOCUMENT");
    for doc in index.documents() {
        println!("{:<32} {}", doc.name, doc.snippets);
    }
    println!();
    println!(
        "{} documents, {} snippets, {} terms",
        index.documents().len(),
        index.snippets().len(),
        index.idf().len()
    );

    Ok(())
}
