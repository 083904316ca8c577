use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use brawlnet::{
    ConnectionState, ControlAction, Inbound, InputFlags, LobbyAnnounce, MatchPhase, MatchSync,
    Role, WorldState,
};

use crate::arena::{Arena, scripted_input};
use crate::tick::FixedTimestep;

pub struct SessionOptions {
    pub tick_rate: u32,
    pub name: String,
    pub variant: u8,
    pub countdown: u8,
    pub match_length: Duration,
    /// How long to keep the link up after game over so the final
    /// lifecycle event is acknowledged.
    pub linger: Duration,
}

/// Tracks what this peer has learned from the other side.
#[derive(Default)]
struct PeerView {
    ever_connected: bool,
    ready: bool,
    input: InputFlags,
    mirrored: Option<WorldState>,
}

pub fn run(mut sync: MatchSync, options: &SessionOptions) -> Result<()> {
    let mut timestep = FixedTimestep::new(options.tick_rate);
    let dt = timestep.dt().as_secs_f32();
    let mut arena = Arena::new();
    let mut view = PeerView::default();
    let mut started_at = None;
    let mut game_over_at = None;
    let mut tick: u64 = 0;
    let mut last = Instant::now();

    let announce = LobbyAnnounce {
        variant: options.variant,
        name: options.name.clone(),
        ready: true,
    };

    log::info!(
        "Running as {} on port {}",
        sync.role().name(),
        sync.transport().local_port()
    );

    loop {
        let now = Instant::now();
        timestep.accumulate(now - last);
        last = now;

        while timestep.consume_tick() {
            tick += 1;
            let local_input = scripted_input(tick);

            let inbound = match (sync.role(), sync.phase()) {
                (_, MatchPhase::Lobby) => sync.lobby_tick(announce.clone(), now),
                (Role::Authoritative, _) => sync.authoritative_tick(arena.snapshot(), now)?,
                (Role::Mirror, MatchPhase::Playing) => sync.mirror_tick(local_input, now)?,
                (Role::Mirror, _) => {
                    let inbound = sync.poll(now);
                    sync.keep_alive();
                    inbound
                }
            };
            observe(&sync, &mut view, &mut arena, inbound)?;

            match (sync.role(), sync.phase()) {
                (Role::Authoritative, MatchPhase::Lobby) if view.ready => {
                    arena.reset();
                    sync.start_match(Some(options.countdown), now)?;
                    started_at = Some(now);
                }
                (Role::Authoritative, MatchPhase::Playing) => {
                    arena.step([local_input, view.input], dt);
                    let expired = started_at.is_some_and(|at| now - at >= options.match_length);
                    if arena.knocked_out() || expired {
                        sync.finish(arena.leader(), now)?;
                    }
                }
                (_, MatchPhase::GameOver) => {
                    game_over_at.get_or_insert(now);
                }
                _ => {}
            }

            if tick % (options.tick_rate as u64 * 5) == 0 {
                let stats = sync.transport().stats();
                log::info!(
                    "{:?}: sent {} received {} resent {} dropped {}",
                    sync.phase(),
                    stats.packets_sent,
                    stats.packets_received,
                    stats.retransmissions,
                    stats.datagrams_dropped
                );
            }
        }

        if game_over_at.is_some_and(|at| now - at >= options.linger) {
            log::info!("Match over, winner {:?}", sync.winner());
            if let Some(state) = &view.mirrored {
                let [first, second] = &state.combatants;
                log::info!("Final health {} / {}", first.health, second.health);
            }
            sync.disconnect();
            return Ok(());
        }

        thread::sleep(Duration::from_millis(1));
    }
}

fn observe(sync: &MatchSync, view: &mut PeerView, arena: &mut Arena, inbound: Inbound) -> Result<()> {
    if inbound.connected {
        if !view.ever_connected {
            log::info!("Peer {:?} reachable", sync.transport().peer_addr());
        }
        view.ever_connected = true;
    } else if view.ever_connected {
        bail!("connection to peer lost");
    } else if sync.transport().state() == ConnectionState::TimedOut {
        bail!("peer never answered");
    }

    if let Some(lobby) = inbound.lobby {
        if lobby.ready && !view.ready {
            log::info!("{} is ready (variant {})", lobby.name, lobby.variant);
        }
        view.ready = lobby.ready;
    }

    if let Some(input) = inbound.input {
        view.input = input;
    }

    if let Some(state) = inbound.state {
        view.mirrored = Some(state);
    }

    for event in inbound.control {
        log::info!("Peer sent {:?}", event.action);
        if event.action == ControlAction::Start {
            arena.reset();
            view.mirrored = None;
            if let Some(countdown) = event.countdown {
                log::info!("Match starts in {}", countdown);
            }
        }
    }

    Ok(())
}
