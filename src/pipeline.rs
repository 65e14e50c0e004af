//! Data thread owning a [`ProcessorChain`], driven over channels.

use std::thread::JoinHandle;

use anyhow::Context;
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, warn};

use crate::chain::ProcessorChain;
use crate::error::{Error, Result};
use crate::format::AudioFormat;
use crate::processors::AudioProcessor;
use crate::stats::{RuntimeStatsHandle, StatsSummary};

pub enum Command {
    Configure(AudioFormat, Sender<Result<AudioFormat>>),
    Input(Vec<u8>),
    /// Codec switch: terminate the current stream, keep playing.
    EndOfCodec,
    EndOfStream,
    Flush,
    Reset,
}

impl Command {
    fn kind(&self) -> &'static str {
        match self {
            Command::Configure(..) => "configure",
            Command::Input(_) => "input",
            Command::EndOfCodec => "end_of_codec",
            Command::EndOfStream => "end_of_stream",
            Command::Flush => "flush",
            Command::Reset => "reset",
        }
    }
}

struct PipelineWorker {
    chain: ProcessorChain,
    commands: Receiver<Command>,
    stop_rx: Receiver<()>,
    output: Sender<Vec<u8>>,
}

impl PipelineWorker {
    fn run(&mut self) -> anyhow::Result<()> {
        loop {
            let command = crossbeam_channel::select! {
                recv(self.stop_rx) -> _ => break,
                recv(self.commands) -> msg => match msg {
                    Ok(command) => command,
                    Err(_) => break,
                },
            };
            let kind = command.kind();
            if let Err(e) = self.handle(command) {
                if e.is_fatal() {
                    return Err(e).with_context(|| format!("{kind} command failed"));
                }
                warn!(command = kind, error = %e, "command failed, continuing");
            }
        }
        Ok(())
    }

    fn handle(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Configure(format, reply) => {
                let result = self.chain.configure(format);
                if let Err(e) = &result {
                    warn!(%format, error = %e, "chain rejected format");
                }
                // Caller may have given up waiting
                let _ = reply.send(result);
                Ok(())
            }
            Command::Input(buffer) => {
                self.chain.queue_input(&buffer)?;
                self.forward()
            }
            Command::EndOfCodec => {
                self.chain.mark_stream_end()?;
                self.forward()
            }
            Command::EndOfStream => {
                self.chain.queue_end_of_stream();
                self.forward()
            }
            Command::Flush => {
                self.chain.flush();
                Ok(())
            }
            Command::Reset => {
                self.chain.reset();
                Ok(())
            }
        }
    }

    fn forward(&mut self) -> Result<()> {
        let out = self.chain.get_output();
        if out.is_empty() {
            return Ok(());
        }
        self.output.send(out).map_err(|_| Error::PipelineClosed)
    }

    fn shutdown(&mut self) {
        let out = self.chain.get_output();
        if !out.is_empty() {
            let _ = self.output.send(out);
        }
        self.chain.reset();
        debug!("pipeline worker shut down");
    }
}

/// Control side of a running pipeline worker.
pub struct PipelineHandle {
    commands: Option<Sender<Command>>,
    stop_tx: Option<Sender<()>>,
    output: Receiver<Vec<u8>>,
    thread: Option<JoinHandle<()>>,
    stats: RuntimeStatsHandle,
}

impl PipelineHandle {
    pub fn spawn(chain: ProcessorChain, stats: RuntimeStatsHandle) -> Self {
        // Unbounded so the producer never blocks on a slow engine.
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (output_tx, output_rx) = crossbeam_channel::unbounded();
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);

        let mut worker = PipelineWorker {
            chain,
            commands: command_rx,
            stop_rx,
            output: output_tx,
        };
        let thread = std::thread::spawn(move || {
            if let Err(e) = worker.run() {
                error!(error = ?e, "pipeline worker stopped");
            }
            worker.shutdown();
        });

        Self {
            commands: Some(command_tx),
            stop_tx: Some(stop_tx),
            output: output_rx,
            thread: Some(thread),
            stats,
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .as_ref()
            .ok_or(Error::PipelineClosed)?
            .send(command)
            .map_err(|_| Error::PipelineClosed)
    }

    /// Configures the chain on the worker thread and waits for the outcome.
    pub fn configure(&self, format: AudioFormat) -> Result<AudioFormat> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.send(Command::Configure(format, reply_tx))?;
        reply_rx.recv().map_err(|_| Error::PipelineClosed)?
    }

    pub fn queue_input(&self, buffer: Vec<u8>) -> Result<()> {
        self.send(Command::Input(buffer))
    }

    pub fn end_of_codec(&self) -> Result<()> {
        self.send(Command::EndOfCodec)
    }

    pub fn end_of_stream(&self) -> Result<()> {
        self.send(Command::EndOfStream)
    }

    pub fn flush(&self) -> Result<()> {
        self.send(Command::Flush)
    }

    pub fn reset(&self) -> Result<()> {
        self.send(Command::Reset)
    }

    pub fn output(&self) -> &Receiver<Vec<u8>> {
        &self.output
    }

    /// Everything produced so far, concatenated.
    pub fn try_output(&self) -> Vec<u8> {
        self.output.try_iter().flatten().collect()
    }

    pub fn stats(&self) -> StatsSummary {
        StatsSummary::from_runtime(&self.stats.snapshot())
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Lets the worker process every queued command, then returns the remaining output.
    pub fn finish(mut self) -> Vec<u8> {
        self.commands = None;
        self.join();
        self.try_output()
    }

    /// Stops the worker without processing queued commands. Safe to repeat.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        self.commands = None;
        self.join();
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("pipeline worker panicked");
            }
        }
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
