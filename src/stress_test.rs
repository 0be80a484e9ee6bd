use async_stream::stream;
use colab_sdk::quick::create_collaborative_clients;
use colab_sdk::{ModelDatabase, Result, SharedString, UndoableSharedList};
use futures::stream::Stream;
use futures::stream::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const DOC_PATH: &str = "stress.json";

/// Statistics collected during stress testing
#[derive(Clone, Debug)]
pub struct StressTestStats {
    pub num_collaborators: usize,
    pub operations_per_collaborator: usize,
    pub total_events: usize,
    pub total_time: Duration,
    pub avg_op_time: Duration,
    pub ops_per_second: f64,
    pub converged: bool,
}

impl StressTestStats {
    pub fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Stress Test Statistics                         ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Collaborators:             {:>38} ║", self.num_collaborators);
        println!("║  Operations per Editor:     {:>38} ║", self.operations_per_collaborator);
        println!("║  Change Events Delivered:   {:>38} ║", self.total_events);
        println!("║  Total Time:                {:>39}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("║  Average Op Time:           {:>36}µs ║", format!("{:.2}", self.avg_op_time.as_micros()));
        println!("║  Operations/Second:         {:>38.0} ║", self.ops_per_second);
        println!("║  Converged:                 {:>38} ║", self.converged);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

/// A random list edit. Indices are reduced modulo the length when applied.
#[derive(Clone, Copy, Debug)]
enum ListEdit {
    Push(u64),
    Insert(usize, u64),
    Set(usize, u64),
    Move(usize, usize),
    Remove(usize),
    Undo,
}

/// Generator that yields (collaborator, edit) pairs
fn list_edit_generator(num_collaborators: usize, num_edits: usize) -> impl Stream<Item = (usize, ListEdit)> {
    stream! {
        let mut rng = StdRng::from_entropy();
        for _ in 0..num_edits {
            let who = rng.gen_range(0..num_collaborators);
            let slot = rng.gen_range(0..1024usize);
            let value = rng.gen::<u64>();
            let edit = match rng.gen_range(0..10) {
                0..=2 => ListEdit::Push(value),
                3 | 4 => ListEdit::Insert(slot, value),
                5 => ListEdit::Set(slot, value),
                6 => ListEdit::Move(slot, rng.gen_range(0..1024usize)),
                7 | 8 => ListEdit::Remove(slot),
                _ => ListEdit::Undo,
            };
            yield (who, edit);
        }
    }
}

fn apply_edit(list: &UndoableSharedList<u64>, edit: ListEdit) -> Result<()> {
    let len = list.len();
    match edit {
        ListEdit::Push(value) => {
            list.push(&value)?;
        }
        ListEdit::Insert(slot, value) => {
            list.insert(slot % (len + 1), &value)?;
        }
        ListEdit::Set(slot, value) if len > 0 => {
            list.set(slot % len, &value)?;
        }
        ListEdit::Move(from, to) if len > 0 => {
            list.move_item(from % len, to % len)?;
        }
        ListEdit::Remove(slot) if len > 0 => {
            list.remove(slot % len)?;
        }
        ListEdit::Undo if list.can_undo() => {
            // Remote edits may have invalidated the history; the list clears it.
            if let Err(e) = list.undo() {
                warn!(error = %e, "undo abandoned");
            }
        }
        _ => {}
    }
    Ok(())
}

async fn open_all(user_names: &[String]) -> Result<(Vec<colab_sdk::Client>, Vec<ModelDatabase>)> {
    let names: Vec<&str> = user_names.iter().map(String::as_str).collect();
    let (_backend, clients) = create_collaborative_clients(&names);
    let mut databases = Vec::with_capacity(clients.len());
    for client in &clients {
        databases.push(client.open_connected(DOC_PATH).await?);
    }
    Ok((clients, databases))
}

fn user_names(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("editor_{i}")).collect()
}

/// Stress test for undoable lists edited by several collaborators
pub async fn stress_test_list(num_collaborators: usize, ops_per_collaborator: usize) -> Result<StressTestStats> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Shared List Stress Test                             ║");
    println!("║  Collaborators: {} | Ops/Collaborator: {} ║",
             num_collaborators, ops_per_collaborator);
    println!("╚════════════════════════════════════════════════════════════╝");

    let start = Instant::now();
    let (clients, databases) = open_all(&user_names(num_collaborators)).await?;

    let events = Arc::new(AtomicUsize::new(0));
    let mut lists = Vec::with_capacity(num_collaborators);
    let mut subscriptions = Vec::with_capacity(num_collaborators);
    for db in &databases {
        let list = db.create_list::<u64>("items")?;
        let counter = events.clone();
        subscriptions.push(list.connect(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
        lists.push(list);
    }

    println!("\n[Phase 1/3] Concurrent appends...");

    // Phase 1: every collaborator appends from its own task
    let mut handles = vec![];
    for (idx, list) in lists.iter().enumerate() {
        let list = list.clone();
        let handle = tokio::spawn(async move {
            for i in 0..ops_per_collaborator {
                let value = ((idx as u64) << 32) | (i as u64);
                list.push(&value)?;
                if i % 100 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            Ok::<_, colab_sdk::DbError>(())
        });
        handles.push(handle);
    }
    for handle in handles {
        match handle.await {
            Ok(result) => result?,
            Err(e) => warn!(error = %e, "append task failed"),
        }
    }
    let expected = num_collaborators * ops_per_collaborator;
    if lists[0].len() != expected {
        warn!(expected, actual = lists[0].len(), "appends lost");
    }

    println!("[Phase 1/3] ✓ Completed");
    println!("[Phase 2/3] Random interleaved edits...");

    // Phase 2: random edits, interleaved across collaborators
    let num_edits = num_collaborators * ops_per_collaborator;
    let mut op_times = Vec::with_capacity(num_edits);
    let mut edits = Box::pin(list_edit_generator(num_collaborators, num_edits));
    while let Some((who, edit)) = edits.next().await {
        let op_start = Instant::now();
        apply_edit(&lists[who], edit)?;
        op_times.push(op_start.elapsed());
        if op_times.len() % 1000 == 0 {
            println!("  Edits applied: {}/{}", op_times.len(), num_edits);
        }
    }

    println!("[Phase 2/3] ✓ Completed");
    println!("[Phase 3/3] Checking convergence...");

    let reference = lists[0].to_vec();
    let converged = lists.iter().all(|list| list.to_vec() == reference);
    info!(len = reference.len(), converged, "list stress test finished");

    drop(subscriptions);
    for client in &clients {
        client.close_all();
    }
    println!("[Phase 3/3] ✓ Completed");

    let total_time = start.elapsed();
    let avg_op_time = if !op_times.is_empty() {
        op_times.iter().sum::<Duration>() / op_times.len() as u32
    } else {
        Duration::ZERO
    };
    let total_operations = expected + num_edits;

    Ok(StressTestStats {
        num_collaborators,
        operations_per_collaborator: ops_per_collaborator,
        total_events: events.load(Ordering::Relaxed),
        total_time,
        avg_op_time,
        ops_per_second: total_operations as f64 / total_time.as_secs_f64(),
        converged,
    })
}

/// Stress test for a shared string receiving random inserts and removals
pub async fn stress_test_text(num_collaborators: usize, ops_per_collaborator: usize) -> Result<StressTestStats> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Shared String Stress Test                           ║");
    println!("║  Collaborators: {} | Ops/Collaborator: {} ║",
             num_collaborators, ops_per_collaborator);
    println!("╚════════════════════════════════════════════════════════════╝");

    let start = Instant::now();
    let (clients, databases) = open_all(&user_names(num_collaborators)).await?;

    let events = Arc::new(AtomicUsize::new(0));
    let mut strings: Vec<SharedString> = Vec::with_capacity(num_collaborators);
    let mut subscriptions = Vec::with_capacity(num_collaborators);
    for db in &databases {
        let text = db.create_string("body")?;
        let counter = events.clone();
        subscriptions.push(text.connect(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
        strings.push(text);
    }

    println!("\n[Phase 1/2] Random text edits...");

    let mut rng = StdRng::from_entropy();
    let num_edits = num_collaborators * ops_per_collaborator;
    let mut op_times = Vec::with_capacity(num_edits);
    for _ in 0..num_edits {
        let text = &strings[rng.gen_range(0..num_collaborators)];
        let len = text.len();
        let op_start = Instant::now();
        if len > 0 && rng.gen_bool(0.3) {
            let from = rng.gen_range(0..len);
            let to = (from + rng.gen_range(1..=4)).min(len);
            text.remove(from, to)?;
        } else {
            let at = rng.gen_range(0..=len);
            let ch = char::from(b'a' + rng.gen_range(0..26u8));
            text.insert(at, &ch.to_string())?;
        }
        op_times.push(op_start.elapsed());
    }

    println!("[Phase 1/2] ✓ Completed");
    println!("[Phase 2/2] Checking convergence...");

    let reference = strings[0].text();
    let converged = strings.iter().all(|s| s.text() == reference);
    info!(chars = reference.chars().count(), converged, "text stress test finished");

    drop(subscriptions);
    for client in &clients {
        client.close_all();
    }
    println!("[Phase 2/2] ✓ Completed");

    let total_time = start.elapsed();
    let avg_op_time = if !op_times.is_empty() {
        op_times.iter().sum::<Duration>() / op_times.len() as u32
    } else {
        Duration::ZERO
    };

    Ok(StressTestStats {
        num_collaborators,
        operations_per_collaborator: ops_per_collaborator,
        total_events: events.load(Ordering::Relaxed),
        total_time,
        avg_op_time,
        ops_per_second: num_edits as f64 / total_time.as_secs_f64(),
        converged,
    })
}

/// Stress test of the list at increasing collaborator counts
pub async fn stress_test_scaling(max_collaborators: usize, step_size: usize) -> Result<()> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║    Scaling Analysis - List Performance vs Collaborators    ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut current = step_size;
    while current <= max_collaborators {
        let stats = stress_test_list(current, 50).await?;
        stats.print();
        current += step_size;
    }
    Ok(())
}
