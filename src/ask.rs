//! `askdocs ask`: answer a question from the ingested documents.

use anyhow::Result;

use askdocs_core::answer::{answer_question, Answer};
use askdocs_core::models::SourceRef;
use askdocs_core::RagError;

use crate::context::AppContext;

/// Run the read path for `question`.
pub async fn ask(ctx: &AppContext, question: &str) -> askdocs_core::Result<Answer> {
    answer_question(
        ctx.store.as_ref(),
        ctx.embedder.as_ref(),
        ctx.generator.as_ref(),
        &ctx.config.retrieval_settings(),
        question,
    )
    .await
}

pub async fn run_ask(ctx: &AppContext, question: &str) -> Result<()> {
    match ask(ctx, question).await {
        Ok(answer) => {
            println!("{}", answer.answer.trim());
            if !answer.sources.is_empty() {
                println!();
                print_sources(&answer.sources);
            }
            Ok(())
        }
        Err(RagError::Generation {
            status,
            message,
            sources,
        }) => {
            if !sources.is_empty() {
                println!("Retrieved context (no answer generated):");
                print_sources(&sources);
            }
            Err(RagError::Generation {
                status,
                message,
                sources,
            }
            .into())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_sources(sources: &[SourceRef]) {
    println!("Sources:");
    for (i, s) in sources.iter().enumerate() {
        println!(
            "  [{}] {} (score {:.2}, chunk {}, offset {})",
            i + 1,
            s.filename,
            s.score,
            s.chunk_index,
            s.start_offset
        );
    }
}
