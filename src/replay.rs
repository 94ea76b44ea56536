//! Replay recording, playback and files
//!
//! A `Replay` stores fixed-size serialized bike states in chunks of
//! `STATES_PER_CHUNK`. Playback walks a fractional cursor over those
//! states so slow motion and rewinding need no special casing.
//!
//! File layout (little-endian):
//! - header: u8 version, i32 guard `0x12345678`, level id and player as
//!   short strings (u8 length), f32 frame rate, i32 state size, bool
//!   finished, f32 finish time in seconds
//! - version 1: events blob, then every chunk, each optionally zlib packed
//! - version 3: a single zlib blob holding events, chunks and moving blocks

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::buffer::{DBuffer, DEFAULT_PART_SIZE};
use crate::consts::*;
use crate::error::{Error, Result};
use crate::sim::rig::BikeRig;
use crate::sim::serialize::SerializedBikeState;
use crate::sim::state::BikeState;
use crate::{float_to_time, time_to_float};

/// Endianness guard written after the version byte
const ENDIAN_GUARD: i32 = 0x1234_5678;

/// Short strings carry a one byte length
const MAX_SHORT_STRING_LEN: usize = 255;

/// Upper bound of a header on disk
const MAX_HEADER_SIZE: u64 = 1 + 4 + 2 * (1 + MAX_SHORT_STRING_LEN as u64) + 4 + 4 + 1 + 4;

// Moving block sampling thresholds (hundredths and level units)
const BLOCK_MIN_DIFF_MOVE: f32 = 0.1;
const BLOCK_MIN_DIFF_ROTATION: f32 = 0.1;
const BLOCK_NEAR_DIFF_TIME: i32 = 15;
const BLOCK_FAR_PLAYER_DIST: f32 = 5.0;
const BLOCK_FAR_DIFF_TIME: i32 = 80;
const BLOCK_VERY_FAR_PLAYER_DIST: f32 = 10.0;
const BLOCK_VERY_FAR_DIFF_TIME: i32 = 150;
const BLOCK_LONG_DIFF_TIME: i32 = 500;
const BLOCK_LONG_DIFF_MOVE: f32 = 0.05;
const BLOCK_LONG_DIFF_ROTATION: f32 = 0.05;

/// On-disk replay layout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplayFormat {
    V1,
    #[default]
    V3,
}

impl ReplayFormat {
    pub fn version(self) -> u8 {
        match self {
            ReplayFormat::V1 => 1,
            ReplayFormat::V3 => 3,
        }
    }
}

/// Where and how replays are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    pub format: ReplayFormat,
    /// Pack state data with zlib
    pub compress: bool,
    pub replays_dir: PathBuf,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            format: ReplayFormat::V3,
            compress: true,
            replays_dir: PathBuf::from("Replays"),
        }
    }
}

/// Header summary, as listed for a replay file
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayInfo {
    pub name: String,
    pub player: String,
    pub level: String,
    pub is_finished: bool,
    /// Hundredths, -1 when unfinished
    pub finish_time: i32,
}

/// Saved playback cursor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayPosition {
    pub end_of_file: bool,
    pub chunk: usize,
    pub state: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovingBlockState {
    pub time: i32,
    pub position: Vec2,
    pub rotation: f32,
}

/// Recorded trajectory of one physics block
#[derive(Debug, Clone, PartialEq)]
pub struct MovingBlockTrack {
    pub name: String,
    pub states: Vec<MovingBlockState>,
}

/// A physics block as seen at recording time
#[derive(Debug, Clone, Copy)]
pub struct BlockSample<'a> {
    pub name: &'a str,
    pub position: Vec2,
    pub rotation: f32,
    pub physics: bool,
}

#[derive(Debug, Clone, Default)]
struct StateChunk {
    data: Vec<u8>,
    num_states: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct ReplayHeader {
    version: u8,
    level_id: String,
    player: String,
    frame_rate: f32,
    state_size: usize,
    finished: bool,
    finish_time: i32,
}

impl ReplayHeader {
    fn write(&self, buf: &mut DBuffer) {
        buf.write_u8(self.version);
        buf.write_i32(ENDIAN_GUARD);
        write_short_string(buf, &self.level_id);
        write_short_string(buf, &self.player);
        buf.write_f32(self.frame_rate);
        buf.write_i32(self.state_size as i32);
        buf.write_bool(self.finished);
        buf.write_f32(time_to_float(self.finish_time));
    }

    fn read(buf: &mut DBuffer) -> Result<Self> {
        let version = buf.read_u8()?;
        if !matches!(version, 0 | 1 | 3) {
            return Err(Error::UnsupportedVersion(version));
        }
        if buf.read_i32()? != ENDIAN_GUARD {
            return Err(Error::InvalidReplay("endianness guard mismatch".into()));
        }
        let level_id = read_short_string(buf)?;
        let player = read_short_string(buf)?;
        let frame_rate = buf.read_f32()?;
        let state_size = buf.read_i32()?;
        if state_size <= 0 {
            return Err(Error::InvalidReplay(format!("state size {state_size}")));
        }
        let finished = buf.read_bool()?;
        let finish_time = float_to_time(buf.read_f32()?);
        Ok(Self {
            version,
            level_id,
            player,
            frame_rate,
            state_size: state_size as usize,
            finished,
            finish_time,
        })
    }
}

fn write_short_string(buf: &mut DBuffer, s: &str) {
    let mut end = s.len().min(MAX_SHORT_STRING_LEN);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    buf.write_u8(end as u8);
    buf.write_buf(&s.as_bytes()[..end]);
}

fn read_short_string(buf: &mut DBuffer) -> Result<String> {
    let len = buf.read_u8()? as usize;
    let bytes = buf.read_bytes(len)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn read_len(buf: &mut DBuffer, what: &str) -> Result<usize> {
    let n = buf.read_i32()?;
    usize::try_from(n).map_err(|_| Error::InvalidReplay(format!("negative {what}: {n}")))
}

fn zlib_compress(data: &[u8], level: Compression) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), level);
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inflate `data`, which must expand to exactly `expected` bytes
fn zlib_decompress(data: &[u8], expected: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected.min(1 << 20));
    ZlibDecoder::new(data)
        .take(expected as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| Error::InvalidReplay(format!("corrupt compressed data: {e}")))?;
    if out.len() != expected {
        return Err(Error::InvalidReplay(format!(
            "decompressed {} bytes, expected {expected}",
            out.len()
        )));
    }
    Ok(out)
}

/// Optionally compressed blob: bool flag, [i32 packed size], bytes
fn write_packed(buf: &mut DBuffer, data: &[u8], compress: bool) {
    let packed = if compress {
        match zlib_compress(data, Compression::best()) {
            Ok(packed) => Some(packed),
            Err(e) => {
                log::warn!("Storing replay data uncompressed: {e}");
                None
            }
        }
    } else {
        None
    };
    match packed {
        Some(packed) => {
            buf.write_bool(true);
            buf.write_i32(packed.len() as i32);
            buf.write_buf(&packed);
        }
        None => {
            buf.write_bool(false);
            buf.write_buf(data);
        }
    }
}

fn read_packed(buf: &mut DBuffer, size: usize) -> Result<Vec<u8>> {
    if buf.read_bool()? {
        let packed_size = read_len(buf, "compressed size")?;
        let packed = buf.read_bytes(packed_size)?;
        zlib_decompress(&packed, size)
    } else {
        buf.read_bytes(size)
    }
}

/// Recorded run of one biker
#[derive(Debug, Clone)]
pub struct Replay {
    config: ReplayConfig,
    file_name: String,
    level_id: String,
    player_name: String,
    frame_rate: f32,
    state_size: usize,
    finished: bool,
    finish_time: i32,

    chunks: Vec<StateChunk>,
    cur_chunk: usize,
    cur_state: f32,
    end_of_file: bool,

    events: DBuffer,
    moving_blocks: Vec<MovingBlockTrack>,
    last_recorded: Option<i32>,
    saved: bool,

    paused: bool,
    speed: f32,
}

impl Replay {
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            config,
            file_name: String::new(),
            level_id: String::new(),
            player_name: String::new(),
            frame_rate: DEFAULT_REPLAY_FRAME_RATE,
            state_size: SERIALIZED_STATE_SIZE,
            finished: false,
            finish_time: 0,
            chunks: Vec::new(),
            cur_chunk: 0,
            cur_state: 0.0,
            end_of_file: false,
            events: DBuffer::output(DEFAULT_PART_SIZE),
            moving_blocks: Vec::new(),
            last_recorded: None,
            saved: false,
            paused: false,
            speed: 1.0,
        }
    }

    /// Start recording into `file_name` (relative to the replays directory)
    pub fn create_replay(
        &mut self,
        file_name: &str,
        level_id: &str,
        player: &str,
        frame_rate: f32,
        state_size: usize,
    ) {
        self.file_name = file_name.to_string();
        self.level_id = level_id.to_string();
        self.player_name = player.to_string();
        self.frame_rate = frame_rate;
        self.state_size = state_size;
        self.chunks.clear();
        self.moving_blocks.clear();
        self.events.init_output(DEFAULT_PART_SIZE);
        self.last_recorded = None;
        self.saved = false;
        self.reinitialize();
    }

    // === Accessors ===

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn level_id(&self) -> &str {
        &self.level_id
    }

    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    pub fn frame_rate(&self) -> f32 {
        self.frame_rate
    }

    pub fn state_size(&self) -> usize {
        self.state_size
    }

    pub fn did_finish(&self) -> bool {
        self.finished
    }

    pub fn finish_time(&self) -> i32 {
        self.finish_time
    }

    pub fn end_of_file(&self) -> bool {
        self.end_of_file
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn finish_replay(&mut self, finished: bool, finish_time: i32) {
        self.finished = finished;
        self.finish_time = finish_time;
    }

    // === Recording ===

    /// Append one state. Chunk boundaries are handled here.
    pub fn store_state(&mut self, state: &SerializedBikeState) {
        let mut bytes = state.to_bytes().to_vec();
        bytes.resize(self.state_size, 0);
        let needs_chunk = self
            .chunks
            .last()
            .is_none_or(|c| c.num_states >= STATES_PER_CHUNK);
        if needs_chunk {
            self.chunks.push(StateChunk {
                data: Vec::with_capacity(STATES_PER_CHUNK * self.state_size),
                num_states: 0,
            });
        }
        if let Some(chunk) = self.chunks.last_mut() {
            chunk.data.extend_from_slice(&bytes);
            chunk.num_states += 1;
        }
        self.saved = false;
    }

    /// Store `state` if more than one frame period passed since the last
    /// stored sample. Returns whether it was stored.
    pub fn record_state(&mut self, time: i32, state: &BikeState, rig: &BikeRig) -> bool {
        let period = 100.0 / self.frame_rate;
        if let Some(last) = self.last_recorded
            && ((time - last) as f32) <= period
        {
            return false;
        }
        self.store_state(&SerializedBikeState::from_state(state, time, rig));
        self.last_recorded = Some(time);
        true
    }

    /// Opaque game event stream stored alongside the states
    pub fn events_mut(&mut self) -> &mut DBuffer {
        &mut self.events
    }

    pub fn events_data(&self) -> Vec<u8> {
        self.events.to_vec()
    }

    /// Sample physics blocks, keeping only meaningful moves
    pub fn store_blocks(&mut self, time: i32, blocks: &[BlockSample], players: &[Vec2], force_all: bool) {
        for block in &blocks[self.moving_blocks.len().min(blocks.len())..] {
            self.moving_blocks.push(MovingBlockTrack {
                name: block.name.to_string(),
                states: Vec::new(),
            });
        }
        for (block, track) in blocks.iter().zip(self.moving_blocks.iter_mut()) {
            if is_block_to_save(block, time, &track.states, players, force_all) {
                track.states.push(MovingBlockState {
                    time,
                    position: block.position,
                    rotation: block.rotation,
                });
            }
        }
    }

    pub fn moving_blocks(&self) -> &[MovingBlockTrack] {
        &self.moving_blocks
    }

    // === Playback ===

    pub fn number_of_frames(&self) -> usize {
        self.chunks.iter().map(|c| c.num_states).sum()
    }

    /// 1-based index of the state under the cursor
    pub fn current_frame(&self) -> usize {
        self.cur_chunk * STATES_PER_CHUNK + self.cur_state as usize + 1
    }

    pub fn position(&self) -> ReplayPosition {
        ReplayPosition {
            end_of_file: self.end_of_file,
            chunk: self.cur_chunk,
            state: self.cur_state,
        }
    }

    pub fn rewind_at_position(&mut self, pos: ReplayPosition) {
        self.end_of_file = pos.end_of_file;
        self.cur_chunk = pos.chunk;
        self.cur_state = pos.state;
    }

    pub fn rewind_at_beginning(&mut self) {
        self.rewind_at_position(ReplayPosition {
            end_of_file: false,
            chunk: 0,
            state: 0.0,
        });
    }

    pub fn reinitialize(&mut self) {
        self.rewind_at_beginning();
    }

    /// Move the cursor by `frames` (fractional, negative rewinds).
    /// Returns false when the end of data was hit.
    pub fn next_state(&mut self, frames: f32) -> bool {
        self.end_of_file = false;
        if self.chunks.is_empty() {
            return false;
        }
        self.cur_state += frames;
        loop {
            let n = self.chunks[self.cur_chunk].num_states as f32;
            if self.cur_state >= n && self.cur_chunk + 1 < self.chunks.len() {
                self.cur_state -= n;
                self.cur_chunk += 1;
            } else if self.cur_state < 0.0 && self.cur_chunk > 0 {
                self.cur_chunk -= 1;
                self.cur_state += self.chunks[self.cur_chunk].num_states as f32;
            } else {
                break;
            }
        }
        if self.cur_state < 0.0 {
            self.cur_state = 0.0;
        }
        let n = self.chunks[self.cur_chunk].num_states;
        if self.cur_state >= n as f32 {
            self.cur_state = n.saturating_sub(1) as f32;
            self.end_of_file = true;
            return false;
        }
        true
    }

    fn is_last_state(&self) -> bool {
        self.cur_chunk + 1 == self.chunks.len()
            && self.cur_state as usize + 1 >= self.chunks[self.cur_chunk].num_states
    }

    /// Serialized state under the cursor
    pub fn peek_serialized(&self) -> Result<SerializedBikeState> {
        let chunk = self.chunks.get(self.cur_chunk).ok_or(Error::EmptyReplay)?;
        let start = self.cur_state as usize * self.state_size;
        let bytes = chunk
            .data
            .get(start..start + self.state_size)
            .ok_or(Error::EmptyReplay)?;
        SerializedBikeState::from_bytes(bytes)
    }

    /// State under the cursor, without moving it
    pub fn peek_state(&self, rig: &BikeRig) -> Result<BikeState> {
        Ok(self.peek_serialized()?.to_state(rig))
    }

    /// State under the cursor, then advance by one frame
    pub fn load_state(&mut self, rig: &BikeRig) -> Result<BikeState> {
        let state = self.peek_state(rig)?;
        self.end_of_file = self.is_last_state();
        if !self.end_of_file {
            self.next_state(1.0);
        }
        Ok(state)
    }

    /// Jump forward by `time` hundredths
    pub fn fastforward(&mut self, time: i32) {
        let frames = (time as f32 * self.frame_rate / 100.0) as i32;
        self.next_state(frames as f32);
    }

    /// Jump back by `time` hundredths, but at least `min_frames`
    pub fn fastrewind(&mut self, time: i32, min_frames: i32) {
        let frames = (time as f32 * self.frame_rate / 100.0) as i32;
        self.next_state(-(frames.max(min_frames) as f32));
    }

    // === Speed ===

    pub fn pause(&mut self) {
        self.paused = !self.paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn faster(&mut self) {
        if !self.paused {
            self.speed += REPLAY_SPEED_INCREMENT;
        }
    }

    pub fn slower(&mut self) {
        if !self.paused {
            self.speed -= REPLAY_SPEED_INCREMENT;
        }
    }

    /// Effective playback speed, 0 while paused
    pub fn speed(&self) -> f32 {
        if self.paused { 0.0 } else { self.speed }
    }

    /// Advance by `frames` scaled by the playback speed
    pub fn advance(&mut self, frames: f32) -> bool {
        if self.paused {
            return true;
        }
        self.next_state(frames * self.speed)
    }

    // === Files ===

    fn header(&self, version: u8) -> ReplayHeader {
        ReplayHeader {
            version,
            level_id: self.level_id.clone(),
            player: self.player_name.clone(),
            frame_rate: self.frame_rate,
            state_size: self.state_size,
            finished: self.finished,
            finish_time: self.finish_time,
        }
    }

    /// Whole file image in the configured format
    pub fn to_file_bytes(&self) -> Result<Vec<u8>> {
        let mut out = DBuffer::output(DEFAULT_PART_SIZE);
        self.header(self.config.format.version()).write(&mut out);
        let events = self.events.to_vec();

        match self.config.format {
            ReplayFormat::V1 => {
                out.write_i32(events.len() as i32);
                write_packed(&mut out, &events, self.config.compress);
                out.write_i32(self.chunks.len() as i32);
                for chunk in &self.chunks {
                    out.write_i32(chunk.num_states as i32);
                    write_packed(&mut out, &chunk.data, self.config.compress);
                }
            }
            ReplayFormat::V3 => {
                let mut body = DBuffer::output(32);
                body.write_i32(events.len() as i32);
                body.write_buf(&events);

                body.write_u32(self.chunks.len() as u32);
                for chunk in &self.chunks {
                    body.write_i32(chunk.num_states as i32);
                    body.write_buf(&chunk.data);
                }

                // A single sample means the block never moved
                let moved: Vec<_> = self.moving_blocks.iter().filter(|b| b.states.len() > 1).collect();
                body.write_u32(moved.len() as u32);
                for block in &moved {
                    body.write_string(&block.name)?;
                    body.write_u32(block.states.len() as u32);
                    for s in &block.states {
                        body.write_i32(s.time);
                        body.write_f32(s.position.x);
                        body.write_f32(s.position.y);
                        body.write_f32(s.rotation);
                    }
                }

                let raw = body.to_vec();
                let level = if self.config.compress {
                    Compression::best()
                } else {
                    Compression::none()
                };
                let packed = zlib_compress(&raw, level)?;
                log::info!(
                    "Replay - uncompressed = {}KB ; compressed = {}KB",
                    raw.len() / 1024,
                    packed.len() / 1024
                );
                out.write_i32(raw.len() as i32);
                out.write_i32(packed.len() as i32);
                out.write_buf(&packed);
            }
        }
        Ok(out.to_vec())
    }

    /// Write the replay into the replays directory unless already saved
    pub fn save(&mut self) -> Result<PathBuf> {
        let path = self.config.replays_dir.join(&self.file_name);
        if self.saved {
            return Ok(path);
        }
        fs::create_dir_all(&self.config.replays_dir)?;
        fs::write(&path, self.to_file_bytes()?)?;
        self.saved = true;
        log::info!("Saved replay {}", path.display());
        Ok(path)
    }

    fn resolve(config: &ReplayConfig, name: &str) -> Option<PathBuf> {
        [
            PathBuf::from(name),
            config.replays_dir.join(name),
            config.replays_dir.join(format!("{name}.rpl")),
        ]
        .into_iter()
        .find(|p| p.is_file())
    }

    /// Open `name`: a path, a file in the replays directory, or the same
    /// without its `.rpl` extension
    pub fn open(config: ReplayConfig, name: &str) -> Result<Self> {
        let Some(path) = Self::resolve(&config, name) else {
            log::warn!("Failed to open replay file for input: {name}");
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("replay not found: {name}"),
            )));
        };
        let data = fs::read(&path)?;
        let mut replay = Self::from_file_bytes(config, data).inspect_err(|e| {
            log::warn!("Unable to open replay {}: {e}", path.display());
        })?;
        replay.file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        replay.saved = true;
        Ok(replay)
    }

    /// Parse a whole file image
    pub fn from_file_bytes(config: ReplayConfig, data: Vec<u8>) -> Result<Self> {
        let mut buf = DBuffer::input(data);
        let header = ReplayHeader::read(&mut buf)?;
        let mut replay = Self::new(config);
        replay.level_id = header.level_id;
        replay.player_name = header.player;
        replay.frame_rate = header.frame_rate;
        replay.state_size = header.state_size;
        replay.finished = header.finished;
        replay.finish_time = header.finish_time;

        let events = match header.version {
            0 | 1 => replay.read_body_v1(&mut buf, header.version)?,
            _ => replay.read_body_v3(&mut buf)?,
        };
        if replay.chunks.is_empty() {
            log::warn!("Replay has no chunk");
            return Err(Error::EmptyReplay);
        }
        replay.events.init_output(DEFAULT_PART_SIZE);
        replay.events.write_buf(&events);
        replay.reinitialize();
        Ok(replay)
    }

    fn read_chunk_data(&self, num_states: usize, data: Vec<u8>) -> Result<StateChunk> {
        if data.len() != num_states * self.state_size {
            return Err(Error::InvalidReplay(format!(
                "chunk of {num_states} states holds {} bytes",
                data.len()
            )));
        }
        Ok(StateChunk { data, num_states })
    }

    fn read_body_v1(&mut self, buf: &mut DBuffer, version: u8) -> Result<Vec<u8>> {
        let events = if version == 1 {
            let size = read_len(buf, "events size")?;
            read_packed(buf, size)?
        } else {
            Vec::new()
        };
        let num_chunks = read_len(buf, "chunk count")?;
        for _ in 0..num_chunks {
            let num_states = read_len(buf, "state count")?;
            let data = read_packed(buf, num_states * self.state_size)?;
            let chunk = self.read_chunk_data(num_states, data)?;
            self.chunks.push(chunk);
        }
        Ok(events)
    }

    fn read_body_v3(&mut self, buf: &mut DBuffer) -> Result<Vec<u8>> {
        let size = read_len(buf, "data size")?;
        let packed_size = read_len(buf, "compressed size")?;
        let packed = buf.read_bytes(packed_size)?;
        let mut body = DBuffer::input(zlib_decompress(&packed, size)?);

        let events_size = read_len(&mut body, "events size")?;
        let events = body.read_bytes(events_size)?;

        let num_chunks = body.read_u32()?;
        for _ in 0..num_chunks {
            let num_states = read_len(&mut body, "state count")?;
            let data = body.read_bytes(num_states * self.state_size)?;
            let chunk = self.read_chunk_data(num_states, data)?;
            self.chunks.push(chunk);
        }

        let num_blocks = body.read_u32()?;
        for _ in 0..num_blocks {
            let name = body.read_string()?;
            let num_states = body.read_u32()?;
            let mut states = Vec::new();
            for _ in 0..num_states {
                let time = body.read_i32()?;
                let x = body.read_f32()?;
                let y = body.read_f32()?;
                let rotation = body.read_f32()?;
                states.push(MovingBlockState {
                    time,
                    position: Vec2::new(x, y),
                    rotation,
                });
            }
            self.moving_blocks.push(MovingBlockTrack { name, states });
        }
        Ok(events)
    }

    /// Header summary of `name`, or `None` if it is not a readable replay
    pub fn get_replay_infos(config: &ReplayConfig, name: &str) -> Option<ReplayInfo> {
        let path = [config.replays_dir.join(format!("{name}.rpl")), PathBuf::from(name)]
            .into_iter()
            .find(|p| p.is_file())?;
        let header = read_header_file(&path).ok()?;
        Some(ReplayInfo {
            name: name.to_string(),
            player: header.player,
            level: header.level_id,
            is_finished: header.finished,
            finish_time: if header.finished { header.finish_time } else { -1 },
        })
    }

    /// Name for a new replay from the local date and time
    pub fn give_automatic_name() -> String {
        chrono::Local::now().format("%d-%m-%y %H_%M").to_string()
    }

    pub fn delete_replay(config: &ReplayConfig, name: &str) -> Result<()> {
        fs::remove_file(config.replays_dir.join(format!("{name}.rpl")))?;
        Ok(())
    }
}

fn read_header_file(path: &Path) -> Result<ReplayHeader> {
    let mut data = Vec::new();
    fs::File::open(path)?.take(MAX_HEADER_SIZE).read_to_end(&mut data)?;
    ReplayHeader::read(&mut DBuffer::input(data))
}

fn is_block_to_save(
    block: &BlockSample,
    time: i32,
    states: &[MovingBlockState],
    players: &[Vec2],
    force_all: bool,
) -> bool {
    if !block.physics {
        return false;
    }
    if force_all {
        return true;
    }
    let Some(prev) = states.last() else {
        return true;
    };
    if time < prev.time + BLOCK_NEAR_DIFF_TIME {
        return false;
    }

    let player_dist = players
        .iter()
        .map(|p| p.distance(block.position))
        .reduce(f32::min)
        .unwrap_or(0.0);
    let moved = |dist: f32, rot: f32| {
        let d = prev.position - block.position;
        d.x.abs() > dist || d.y.abs() > dist || (prev.rotation - block.rotation).abs() > rot
    };

    if moved(BLOCK_MIN_DIFF_MOVE, BLOCK_MIN_DIFF_ROTATION) {
        // Far blocks are sampled less often
        if player_dist >= BLOCK_FAR_PLAYER_DIST && time <= prev.time + BLOCK_FAR_DIFF_TIME {
            return false;
        }
        if player_dist >= BLOCK_VERY_FAR_PLAYER_DIST && time <= prev.time + BLOCK_VERY_FAR_DIFF_TIME {
            return false;
        }
        return true;
    }

    // Settle small drifts once in a while
    time > prev.time + BLOCK_LONG_DIFF_TIME && moved(BLOCK_LONG_DIFF_MOVE, BLOCK_LONG_DIFF_ROTATION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::state::DriveDir;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir, format: ReplayFormat, compress: bool) -> ReplayConfig {
        ReplayConfig {
            format,
            compress,
            replays_dir: dir.path().to_path_buf(),
        }
    }

    fn sample(time: i32) -> SerializedBikeState {
        let rig = BikeRig::default();
        let mut state = BikeState::new();
        state.dir = DriveDir::Right;
        state.center = Vec2::new(time as f32 * 0.01, 1.0);
        state.update_frame_anchors(&rig);
        state.front_wheel = state.relaxed_front_wheel;
        state.rear_wheel = state.relaxed_rear_wheel;
        SerializedBikeState::from_state(&state, time, &rig)
    }

    fn recorded(states: usize, config: ReplayConfig) -> Replay {
        let mut replay = Replay::new(config);
        replay.create_replay("test.rpl", "level1", "alice", 25.0, SERIALIZED_STATE_SIZE);
        for i in 0..states {
            replay.store_state(&sample(i as i32 * 4));
        }
        replay
    }

    #[test]
    fn test_store_state_spans_chunks() {
        let replay = recorded(STATES_PER_CHUNK + 10, ReplayConfig::default());
        assert_eq!(replay.chunks.len(), 2);
        assert_eq!(replay.chunks[0].num_states, STATES_PER_CHUNK);
        assert_eq!(replay.chunks[1].num_states, 10);
        assert_eq!(replay.number_of_frames(), STATES_PER_CHUNK + 10);
    }

    #[test]
    fn test_next_state_carries_across_chunks() {
        let mut replay = recorded(STATES_PER_CHUNK + 10, ReplayConfig::default());
        assert!(replay.next_state((STATES_PER_CHUNK + 3) as f32));
        assert_eq!(replay.position().chunk, 1);
        assert_eq!(replay.position().state, 3.0);
        assert_eq!(replay.current_frame(), STATES_PER_CHUNK + 4);
        assert_eq!(replay.peek_serialized().unwrap(), sample((STATES_PER_CHUNK as i32 + 3) * 4));

        assert!(replay.next_state(-5.0));
        assert_eq!(replay.position().chunk, 0);
        assert_eq!(replay.position().state, (STATES_PER_CHUNK - 2) as f32);
    }

    #[test]
    fn test_next_state_clamps() {
        let mut replay = recorded(20, ReplayConfig::default());
        assert!(!replay.next_state(100.0));
        assert!(replay.end_of_file());
        assert_eq!(replay.position().state, 19.0);
        assert!(replay.next_state(-100.0));
        assert!(!replay.end_of_file());
        assert_eq!(replay.position().state, 0.0);
    }

    #[test]
    fn test_next_state_overflow_across_chunks_sets_end_of_file() {
        let mut replay = recorded(STATES_PER_CHUNK + 5, ReplayConfig::default());
        assert!(!replay.next_state((STATES_PER_CHUNK * 3) as f32));
        assert!(replay.end_of_file());
        assert_eq!(replay.position().chunk, 1);
        assert_eq!(replay.position().state, 4.0);
        // Still readable at the clamp point
        assert_eq!(replay.peek_serialized().unwrap(), sample((STATES_PER_CHUNK as i32 + 4) * 4));
    }

    #[test]
    fn test_load_state_reaches_end_of_file() {
        let rig = BikeRig::default();
        let mut replay = recorded(3, ReplayConfig::default());
        let times: Vec<i32> = (0..3).map(|_| replay.load_state(&rig).unwrap().game_time).collect();
        assert_eq!(times, vec![0, 4, 8]);
        assert!(replay.end_of_file());
        // Stays on the last state
        assert_eq!(replay.load_state(&rig).unwrap().game_time, 8);
    }

    #[test]
    fn test_fractional_advance() {
        let mut replay = recorded(10, ReplayConfig::default());
        replay.next_state(0.25);
        replay.next_state(0.25);
        assert_eq!(replay.current_frame(), 1);
        replay.next_state(0.5);
        assert_eq!(replay.current_frame(), 2);
    }

    #[test]
    fn test_fastforward_and_rewind() {
        let mut replay = recorded(100, ReplayConfig::default());
        // 2 seconds at 25 fps
        replay.fastforward(200);
        assert_eq!(replay.position().state, 50.0);
        replay.fastrewind(40, 0);
        assert_eq!(replay.position().state, 40.0);
        replay.fastrewind(1, 3);
        assert_eq!(replay.position().state, 37.0);
    }

    #[test]
    fn test_speed_controls() {
        let mut replay = recorded(100, ReplayConfig::default());
        replay.faster();
        assert_eq!(replay.speed(), 1.25);
        replay.pause();
        assert_eq!(replay.speed(), 0.0);
        replay.slower();
        replay.advance(10.0);
        assert_eq!(replay.position().state, 0.0);
        replay.pause();
        for _ in 0..6 {
            replay.slower();
        }
        assert_eq!(replay.speed(), -0.25);
    }

    #[test]
    fn test_record_state_cadence() {
        let rig = BikeRig::default();
        let mut replay = Replay::new(ReplayConfig::default());
        replay.create_replay("r.rpl", "l", "p", 25.0, SERIALIZED_STATE_SIZE);
        let state = BikeState::new();
        let stored = (0..20).filter(|t| replay.record_state(*t, &state, &rig)).count();
        // t = 0, 5, 10, 15
        assert_eq!(stored, 4);
    }

    #[test]
    fn test_save_and_open_all_formats() {
        for (format, compress) in [
            (ReplayFormat::V1, true),
            (ReplayFormat::V1, false),
            (ReplayFormat::V3, true),
            (ReplayFormat::V3, false),
        ] {
            let dir = TempDir::new().unwrap();
            let mut replay = recorded(STATES_PER_CHUNK + 7, config(&dir, format, compress));
            replay.events_mut().write_i32(42);
            replay.finish_replay(true, 1234);
            replay.save().unwrap();
            assert!(replay.is_saved());

            let opened = Replay::open(config(&dir, format, compress), "test").unwrap();
            assert_eq!(opened.level_id(), "level1");
            assert_eq!(opened.player_name(), "alice");
            assert_eq!(opened.frame_rate(), 25.0);
            assert!(opened.did_finish());
            assert_eq!(opened.finish_time(), 1234);
            assert_eq!(opened.number_of_frames(), STATES_PER_CHUNK + 7);
            assert_eq!(opened.events_data(), 42i32.to_le_bytes().to_vec());
            assert_eq!(opened.peek_serialized().unwrap(), sample(0));
        }
    }

    #[test]
    fn test_moving_blocks_survive_v3() {
        let dir = TempDir::new().unwrap();
        let mut replay = recorded(5, config(&dir, ReplayFormat::V3, true));
        let mut block = BlockSample {
            name: "crate",
            position: Vec2::ZERO,
            rotation: 0.0,
            physics: true,
        };
        let still = BlockSample { name: "rock", ..block };
        replay.store_blocks(0, &[block, still], &[Vec2::ZERO], false);
        block.position = Vec2::new(1.0, 0.0);
        replay.store_blocks(20, &[block, still], &[Vec2::ZERO], false);
        replay.store_blocks(40, &[block, still], &[Vec2::ZERO], false);
        assert_eq!(replay.moving_blocks()[0].states.len(), 2);
        assert_eq!(replay.moving_blocks()[1].states.len(), 1);
        replay.save().unwrap();

        let opened = Replay::open(config(&dir, ReplayFormat::V3, true), "test.rpl").unwrap();
        assert_eq!(opened.moving_blocks().len(), 1);
        assert_eq!(opened.moving_blocks()[0].name, "crate");
        assert_eq!(opened.moving_blocks()[0].states[1].position, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn test_far_blocks_sampled_less_often() {
        let prev = [MovingBlockState {
            time: 0,
            position: Vec2::ZERO,
            rotation: 0.0,
        }];
        let block = BlockSample {
            name: "b",
            position: Vec2::new(1.0, 0.0),
            rotation: 0.0,
            physics: true,
        };
        assert!(is_block_to_save(&block, 20, &prev, &[Vec2::ZERO], false));
        assert!(!is_block_to_save(&block, 20, &prev, &[Vec2::new(20.0, 0.0)], false));
        assert!(is_block_to_save(&block, 151, &prev, &[Vec2::new(20.0, 0.0)], false));
        let static_block = BlockSample { physics: false, ..block };
        assert!(!is_block_to_save(&static_block, 151, &prev, &[], true));
    }

    #[test]
    fn test_replay_infos() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, ReplayFormat::V3, true);
        let mut replay = recorded(3, cfg.clone());
        replay.save().unwrap();

        let info = Replay::get_replay_infos(&cfg, "test").unwrap();
        assert_eq!(info.level, "level1");
        assert_eq!(info.player, "alice");
        assert!(!info.is_finished);
        assert_eq!(info.finish_time, -1);

        assert!(Replay::get_replay_infos(&cfg, "missing").is_none());
        fs::write(dir.path().join("junk.rpl"), b"\x07garbage").unwrap();
        assert!(Replay::get_replay_infos(&cfg, "junk").is_none());
    }

    #[test]
    fn test_corrupt_files_fail_cleanly() {
        let cfg = ReplayConfig::default();
        let replay = recorded(10, cfg.clone());
        let bytes = replay.to_file_bytes().unwrap();

        let truncated = bytes[..bytes.len() - 5].to_vec();
        assert!(Replay::from_file_bytes(cfg.clone(), truncated).is_err());

        let mut bad_guard = bytes.clone();
        bad_guard[1] ^= 0xff;
        assert!(matches!(
            Replay::from_file_bytes(cfg.clone(), bad_guard),
            Err(Error::InvalidReplay(_))
        ));

        let mut bad_version = bytes;
        bad_version[0] = 2;
        assert!(matches!(
            Replay::from_file_bytes(cfg, bad_version),
            Err(Error::UnsupportedVersion(2))
        ));
    }

    #[test]
    fn test_empty_replay_rejected() {
        let replay = recorded(0, ReplayConfig::default());
        let bytes = replay.to_file_bytes().unwrap();
        assert!(matches!(
            Replay::from_file_bytes(ReplayConfig::default(), bytes),
            Err(Error::EmptyReplay)
        ));
    }

    #[test]
    fn test_delete_replay() {
        let dir = TempDir::new().unwrap();
        let cfg = config(&dir, ReplayFormat::V3, true);
        let mut replay = recorded(3, cfg.clone());
        replay.file_name = "gone.rpl".into();
        replay.save().unwrap();
        Replay::delete_replay(&cfg, "gone").unwrap();
        assert!(!dir.path().join("gone.rpl").exists());
    }

    #[test]
    fn test_automatic_name_shape() {
        let name = Replay::give_automatic_name();
        assert_eq!(name.len(), "18-10-26 14_05".len());
        assert_eq!(&name[2..3], "-");
        assert_eq!(&name[11..12], "_");
    }

    #[test]
    fn test_short_strings_truncate() {
        let mut buf = DBuffer::output(8);
        write_short_string(&mut buf, &"x".repeat(300));
        buf.convert_output_to_input();
        assert_eq!(read_short_string(&mut buf).unwrap().len(), 255);
    }

    proptest! {
        #[test]
        fn prop_recorded_states_read_back_in_time_order(
            steps in prop::collection::vec(1i32..12, 1..400),
        ) {
            let rig = BikeRig::default();
            let mut replay = Replay::new(ReplayConfig::default());
            replay.create_replay("prop.rpl", "level1", "alice", 25.0, SERIALIZED_STATE_SIZE);
            let mut time = 0;
            let mut kept = Vec::new();
            for step in steps {
                time += step;
                let mut state = BikeState::new();
                state.center = Vec2::new(time as f32 * 0.01, 0.5);
                state.update_frame_anchors(&rig);
                state.front_wheel = state.relaxed_front_wheel;
                state.rear_wheel = state.relaxed_rear_wheel;
                if replay.record_state(time, &state, &rig) {
                    kept.push(time);
                }
            }

            let mut read = Vec::new();
            loop {
                read.push(replay.load_state(&rig).unwrap().game_time);
                if replay.end_of_file() {
                    break;
                }
            }
            prop_assert!(read.windows(2).all(|w| w[0] <= w[1]), "{read:?}");
            prop_assert_eq!(read, kept);
        }
    }
}
