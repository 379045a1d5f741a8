use crossbeam_channel::Receiver;
use indicatif::{ProgressBar, ProgressStyle};

use common::Signal;

/// Passive consumer of the signal queue; runs on its own thread for the
/// duration of a scheduler run and performs the one deliberately blocking
/// pop in the system. Terminates on the end-of-stream marker (or channel
/// disconnect) and returns the number of triplet tokens it counted.
///
/// Purely observational: never on the aggregation path.
pub fn run_progress_listener(signals: Receiver<Signal>, expected_triplets: u64) -> u64 {
    let bar = ProgressBar::new(expected_triplets);
    let style = ProgressStyle::with_template("[{elapsed_precise}] {bar:40} {pos}/{len} triplets")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);

    let mut counted = 0u64;
    while let Ok(signal) = signals.recv() {
        match signal {
            Signal::TripletDone => {
                counted += 1;
                bar.inc(1);
            }
            Signal::Finished => break,
        }
    }
    bar.finish_and_clear();
    counted
}

#[cfg(test)]
mod tests {
    use common::Signal;
    use crossbeam_channel::unbounded;

    use super::run_progress_listener;

    #[test]
    fn counts_tokens_until_finished_marker() {
        let (tx, rx) = unbounded();
        for _ in 0..3 {
            tx.send(Signal::TripletDone).expect("send");
        }
        tx.send(Signal::Finished).expect("send");
        tx.send(Signal::TripletDone).expect("send");

        assert_eq!(run_progress_listener(rx, 3), 3);
    }

    #[test]
    fn terminates_on_disconnect_without_marker() {
        let (tx, rx) = unbounded();
        tx.send(Signal::TripletDone).expect("send");
        drop(tx);
        assert_eq!(run_progress_listener(rx, 1), 1);
    }
}
