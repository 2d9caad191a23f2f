//! Line-oriented command handling on stdin

use std::path::Path;
use std::str::FromStr;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{JukeboxError, PageDirection};
use crate::model::ControlSignal;
use crate::view::render_queue;
use super::Jukebox;

const HELP: &str = "\
/text      search for text          n / p      next / previous results page
add N      queue result N           rm N       remove queue entry N
mv A B     move queue entry A to B  sw A B     swap queue entries A and B
ls         show the queue           results    show search results
play       start playback           stop       stop playback
skip       skip current track       status     playback status
set        show settings            set NAME VALUE   change a setting
q          quit";

/// One parsed command line. Indices are already 0-based.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Search(String),
    Page(PageDirection),
    Add(usize),
    Remove(usize),
    Move(usize, usize),
    Swap(usize, usize),
    List,
    Results,
    Play,
    Control(ControlSignal),
    Status,
    ShowSettings,
    Set(String, String),
    Help,
    Quit,
}

/// Parse a 1-based user index
fn index(word: Option<&str>) -> std::result::Result<usize, String> {
    let word = word.ok_or("missing number")?;
    match word.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(format!("not a valid number: {}", word)),
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> std::result::Result<Self, Self::Err> {
        let line = line.trim();
        if let Some(text) = line.strip_prefix('/') {
            if text.trim().is_empty() {
                return Err("nothing to search for".to_string());
            }
            return Ok(Command::Search(text.trim().to_string()));
        }

        let mut words = line.split_whitespace();
        let command = match words.next().unwrap_or_default() {
            "n" => Command::Page(PageDirection::Next),
            "p" => Command::Page(PageDirection::Prev),
            "add" => Command::Add(index(words.next())?),
            "rm" => Command::Remove(index(words.next())?),
            "mv" => Command::Move(index(words.next())?, index(words.next())?),
            "sw" => Command::Swap(index(words.next())?, index(words.next())?),
            "ls" => Command::List,
            "results" => Command::Results,
            "play" => Command::Play,
            "stop" => Command::Control(ControlSignal::Stop),
            "skip" => Command::Control(ControlSignal::Skip),
            "status" => Command::Status,
            "set" => match words.next() {
                None => Command::ShowSettings,
                Some(name) => {
                    let value: Vec<&str> = words.by_ref().collect();
                    Command::Set(name.to_string(), value.join(" "))
                }
            },
            "h" | "help" | "?" => Command::Help,
            "q" | "quit" => Command::Quit,
            other => return Err(format!("unknown command: {}", other)),
        };
        if words.next().is_some() {
            return Err(format!("too many arguments: {}", line));
        }
        Ok(command)
    }
}

fn terminal_width(fallback: usize) -> usize {
    crossterm::terminal::size()
        .map(|(cols, _)| cols as usize)
        .unwrap_or(fallback)
}

impl Jukebox {
    /// Run one command and return the lines to show the user
    pub async fn execute(&self, command: Command, config_path: &Path) -> Vec<String> {
        match self.try_execute(command, config_path).await {
            Ok(lines) => lines,
            Err(e) => {
                tracing::debug!(error = %e, "Command failed");
                vec![e.user_message()]
            }
        }
    }

    async fn try_execute(
        &self,
        command: Command,
        config_path: &Path,
    ) -> crate::error::Result<Vec<String>> {
        let width = terminal_width(self.settings.read().await.console_width as usize);
        let lines = match command {
            Command::Search(text) => {
                self.search(&text).await?;
                render_queue(&self.get_results().await, width)
            }
            Command::Page(direction) => {
                self.page(direction).await?;
                let mut lines = render_queue(&self.get_results().await, width);
                lines.push(format!("Page {}", self.page_number().await));
                lines
            }
            Command::Add(i) => {
                let position = self.enqueue(i).await?;
                vec![format!("Added to queue at position {}", position + 1)]
            }
            Command::Remove(i) => {
                let track = self.dequeue(i).await?;
                vec![format!("Removed {}", track.title)]
            }
            Command::Move(from, to) => {
                self.move_track(from, to).await?;
                render_queue(&self.get_active_queue().await, width)
            }
            Command::Swap(a, b) => {
                self.swap_tracks(a, b).await?;
                render_queue(&self.get_active_queue().await, width)
            }
            Command::List => render_queue(&self.get_active_queue().await, width),
            Command::Results => render_queue(&self.get_results().await, width),
            Command::Play => {
                if self.get_active_queue().await.is_empty() {
                    return Err(JukeboxError::NoData("the queue".to_string()));
                }
                self.start().await;
                vec!["Playing".to_string()]
            }
            Command::Control(signal) => {
                self.control(signal).await;
                vec![]
            }
            Command::Status => {
                let status = self.get_status().await;
                vec![format!(
                    "{} [{:.0}%] (playlist {})",
                    status.now_playing_title, status.percent_elapsed, status.playlist_version
                )]
            }
            Command::ShowSettings => self
                .settings
                .read()
                .await
                .entries()
                .into_iter()
                .map(|(name, value)| format!("{:<20} {}", name, value))
                .collect(),
            Command::Set(name, value) => {
                let mut settings = self.settings.write().await;
                let message = settings.set(&name, &value)?;
                self.cache.set_capacity(settings.max_cached_streams);
                if let Err(e) = settings.save(config_path) {
                    tracing::warn!(error = %e, "Failed to save settings");
                }
                vec![message]
            }
            Command::Help => HELP.lines().map(str::to_string).collect(),
            Command::Quit => vec![],
        };
        Ok(lines)
    }
}

/// Read commands from stdin until `q`, end of input, or Ctrl-C while idle.
/// Ctrl-C during playback halts the current track instead.
pub async fn run_command_loop(jukebox: &Jukebox, config_path: &Path) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("Type h for help");

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                if jukebox.state().is_playing().await {
                    jukebox.halt().await;
                    continue;
                }
                None
            }
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            if let Some(message) = jukebox.state().take_message().await {
                println!("{}", message);
            }
            continue;
        }

        match line.parse::<Command>() {
            Ok(Command::Quit) => break,
            Ok(command) => {
                tracing::debug!(?command, "Command received");
                for out in jukebox.execute(command, config_path).await {
                    println!("{}", out);
                }
            }
            Err(e) => println!("{}", e),
        }
        if let Some(message) = jukebox.state().take_message().await {
            println!("{}", message);
        }
    }

    if jukebox.state().is_playing().await {
        jukebox.halt().await;
    }
    jukebox.join_worker().await;
    Ok(())
}
