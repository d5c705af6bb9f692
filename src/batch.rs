//! Batch chapter illustration over a bounded worker pool.
//!
//! One image-cascade invocation per chapter, fanned out across a fixed
//! number of worker threads. Workers pull from a shared queue, so
//! completions land out of order; each one reports its own progress and
//! (when a store is wired in) records its own image reference as soon as
//! it finishes. Per-invocation state is fully isolated — the only shared
//! mutable resource is the health registry inside the cascade.

use std::collections::VecDeque;
use std::sync::{Mutex, mpsc};

use crate::cascade::image::ImageCascade;
use crate::model::{Chapter, ImageOutcome, ImageRef};
use crate::provider::ChapterStore;

#[derive(Debug)]
pub struct ChapterIllustration {
    pub chapter_id: String,
    pub outcome: ImageOutcome,
    pub bytes: Vec<u8>,
}

/// Illustrate every chapter, `pool_size` at a time. When `store` is given,
/// each completion writes its image reference immediately. The returned
/// vector reflects completion order, not input order.
pub fn illustrate_chapters(
    cascade: &ImageCascade,
    chapters: Vec<Chapter>,
    pool_size: usize,
    style: &str,
    store: Option<&dyn ChapterStore>,
) -> Vec<ChapterIllustration> {
    if chapters.is_empty() {
        return Vec::new();
    }

    let batch_id = uuid::Uuid::new_v4();
    let workers = pool_size.clamp(1, 8).min(chapters.len());
    let queue = Mutex::new(VecDeque::from(chapters));
    let (sender, receiver) = mpsc::channel();

    std::thread::scope(|scope| {
        for worker in 0..workers {
            let sender = sender.clone();
            let queue = &queue;
            scope.spawn(move || {
                loop {
                    let next = match queue.lock() {
                        Ok(mut guard) => guard.pop_front(),
                        Err(poisoned) => poisoned.into_inner().pop_front(),
                    };
                    let Some(chapter) = next else { break };

                    let summary = if chapter.summary.trim().is_empty() {
                        chapter.title.clone()
                    } else {
                        chapter.summary.clone()
                    };
                    let outcome = cascade.generate(&summary, style);
                    let bytes = cascade.materialize(&outcome.reference, &chapter.title);

                    if let Some(store) = store {
                        let reference = reference_string(&outcome.reference);
                        if let Err(error) = store.update_image(&chapter.id, &reference) {
                            tracing::warn!(chapter = %chapter.id, %error, "image reference not recorded");
                        }
                    }

                    tracing::info!(
                        batch = %batch_id,
                        worker,
                        chapter = %chapter.id,
                        source = outcome.source.as_str(),
                        "chapter illustrated"
                    );
                    let _ = sender.send(ChapterIllustration {
                        chapter_id: chapter.id,
                        outcome,
                        bytes,
                    });
                }
            });
        }
        drop(sender);
    });

    receiver.into_iter().collect()
}

fn reference_string(reference: &ImageRef) -> String {
    match reference {
        ImageRef::Url { url } => url.clone(),
        ImageRef::Placeholder { seed } => format!("placeholder://{seed}"),
    }
}
