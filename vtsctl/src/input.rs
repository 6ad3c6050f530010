//! Operator command input
//!
//! Reads stdin on a plain OS thread and forwards parsed commands to the
//! driver. The thread is detached and must not be a tokio blocking task:
//! a read blocked on stdin cannot hold the process open after the
//! connection ends.

use std::io::{BufRead, Write};

use tokio::sync::mpsc;
use vtsctl_core::Command;

/// Start reading commands from stdin
pub fn spawn_stdin_reader(tx: mpsc::Sender<Command>) {
    let spawned = std::thread::Builder::new()
        .name("vtsctl-stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            read_commands(stdin.lock(), &tx, || {
                print!("> ");
                let _ = std::io::stdout().flush();
            });
        });

    if let Err(e) = spawned {
        tracing::error!("Failed to start command reader: {}", e);
    }
}

/// Forward commands until EOF, `quit`, or the driver going away
pub fn read_commands<R, P>(reader: R, tx: &mpsc::Sender<Command>, mut prompt: P)
where
    R: BufRead,
    P: FnMut(),
{
    prompt();
    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to read command: {}", e);
                break;
            }
        };

        let Some(cmd) = Command::parse(&line) else {
            prompt();
            continue;
        };

        let quit = cmd == Command::Quit;
        if tx.blocking_send(cmd).is_err() {
            tracing::debug!("Driver gone, stopping command reader");
            return;
        }
        if quit {
            return;
        }
        prompt();
    }
    tracing::debug!("Command input reached EOF");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn collect(input: &str) -> (Vec<Command>, usize) {
        let (tx, mut rx) = mpsc::channel(16);
        let mut prompts = 0;
        read_commands(Cursor::new(input.to_string()), &tx, || prompts += 1);
        drop(tx);

        let mut cmds = Vec::new();
        while let Ok(cmd) = rx.try_recv() {
            cmds.push(cmd);
        }
        (cmds, prompts)
    }

    #[test]
    fn test_reads_until_quit() {
        let (cmds, _) = collect("smile\n\nreset\nquit\nangry\n");
        assert_eq!(
            cmds,
            vec![
                Command::Activate("smile".to_string()),
                Command::Reset,
                Command::Quit,
            ]
        );
    }

    #[test]
    fn test_unrecognized_lines_are_forwarded() {
        let (cmds, prompts) = collect("make me smile\n");
        assert_eq!(cmds, vec![Command::Unrecognized("make me smile".to_string())]);
        // Initial prompt plus one re-prompt
        assert_eq!(prompts, 2);
    }

    #[test]
    fn test_stops_when_driver_is_gone() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let mut prompts = 0;
        read_commands(Cursor::new("smile\nangry\n"), &tx, || prompts += 1);
        assert_eq!(prompts, 1);
    }
}
