//! The download session: impersonates a client to harvest a remote
//! server's full quest catalog. Unlike the dispatcher, which serves
//! commands, this component drives the protocol — it is the client side
//! of every exchange.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tracing::{debug, info, warn};

use crate::cipher::{KeyFile, PatchCipher, PsoCipher, V2Cipher, V3Cipher, V4Cipher};
use crate::dispatch::opcodes;
use crate::error::{CoreError, Result};
use crate::family::{ClientFamily, LanguageCode};
use crate::framing::Channel;

/// Which episode a game-creation template targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Episode {
    Ep1,
    Ep2,
    Ep4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameMode {
    Normal,
    Battle,
    Challenge,
    Solo,
}

/// One entry of the built-in game-creation catalogue.
#[derive(Debug, Clone, Copy)]
pub struct GameConfig {
    pub mode: GameMode,
    pub episode: Episode,
    v1_ok: bool,
    v2_ok: bool,
    v3_ok: bool,
}

impl GameConfig {
    fn applicable(&self, family: ClientFamily) -> bool {
        if family.is_v1() {
            self.v1_ok
        } else if family.is_v2() {
            self.v2_ok
        } else {
            self.v3_ok
        }
    }
}

/// The nine-entry catalogue of `{mode} x {episode}` templates, in the
/// fixed iteration order a session walks them in.
pub const GAME_CONFIGS: [GameConfig; 9] = [
    GameConfig { mode: GameMode::Normal, episode: Episode::Ep1, v1_ok: true, v2_ok: true, v3_ok: true },
    GameConfig { mode: GameMode::Normal, episode: Episode::Ep2, v1_ok: false, v2_ok: false, v3_ok: true },
    GameConfig { mode: GameMode::Normal, episode: Episode::Ep4, v1_ok: false, v2_ok: false, v3_ok: true },
    GameConfig { mode: GameMode::Battle, episode: Episode::Ep1, v1_ok: true, v2_ok: true, v3_ok: true },
    GameConfig { mode: GameMode::Challenge, episode: Episode::Ep1, v1_ok: false, v2_ok: true, v3_ok: true },
    GameConfig { mode: GameMode::Challenge, episode: Episode::Ep2, v1_ok: false, v2_ok: false, v3_ok: true },
    GameConfig { mode: GameMode::Solo, episode: Episode::Ep1, v1_ok: false, v2_ok: false, v3_ok: true },
    GameConfig { mode: GameMode::Solo, episode: Episode::Ep2, v1_ok: false, v2_ok: false, v3_ok: true },
    GameConfig { mode: GameMode::Solo, episode: Episode::Ep4, v1_ok: false, v2_ok: false, v3_ok: true },
];

/// The family-dependent credential tuple. Construction validates that the
/// supplied variant matches the target family.
#[derive(Debug, Clone)]
pub enum Credentials {
    SerialAccessKey { serial_number: String, access_key: String },
    UserPassword { username: String, password: String },
    Xbox { gamertag: String, user_id: String, account_id: String },
}

impl Credentials {
    fn matches_family(&self, family: ClientFamily) -> bool {
        match self {
            Credentials::Xbox { .. } => matches!(family, ClientFamily::XbV3),
            Credentials::UserPassword { .. } => matches!(family, ClientFamily::BbV4) || family.is_patch_server(),
            Credentials::SerialAccessKey { .. } => {
                !matches!(family, ClientFamily::XbV3 | ClientFamily::BbV4) && !family.is_patch_server()
            }
        }
    }
}

/// Immutable session configuration, validated at construction.
#[derive(Debug, Clone)]
pub struct Config {
    pub endpoint: String,
    pub output_dir: PathBuf,
    pub family: ClientFamily,
    pub language: LanguageCode,
    pub bb_key_file: Option<KeyFile>,
    pub credentials: Credentials,
    pub character_snapshot: Vec<u8>,
    pub ship_names: HashSet<String>,
    pub on_complete_commands: Vec<String>,
    pub interactive: bool,
    pub show_command_data: bool,
}

impl Config {
    pub fn new(
        endpoint: String,
        output_dir: PathBuf,
        family: ClientFamily,
        language: LanguageCode,
        bb_key_file: Option<KeyFile>,
        credentials: Credentials,
        character_snapshot: Vec<u8>,
        ship_names: HashSet<String>,
        on_complete_commands: Vec<String>,
        interactive: bool,
        show_command_data: bool,
    ) -> Result<Self> {
        if !credentials.matches_family(family) {
            return Err(CoreError::protocol("missing credentials for target client family"));
        }
        if family.uses_v4_cipher() && bb_key_file.is_none() {
            return Err(CoreError::protocol("missing credentials: BB requires a key file"));
        }
        Ok(Self {
            endpoint,
            output_dir,
            family,
            language,
            bb_key_file,
            credentials,
            character_snapshot,
            ship_names,
            on_complete_commands,
            interactive,
            show_command_data,
        })
    }
}

/// Strips PSO's `\tC`-style colour control codes from a displayed name.
fn strip_color_codes(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\t' {
            chars.next();
        } else {
            out.push(c);
        }
    }
    out
}

fn sanitise_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RequestKey {
    menu_id: u32,
    item_id: u32,
}

struct OpenFile {
    internal_name: String,
    expected_size: u32,
    data: Vec<u8>,
}

/// Per-connection mutable state.
struct State {
    hardware_id: u32,
    guild_card_number: u32,
    client_config: Vec<u8>,
    /// The first 0x28 bytes of the most recently received command, kept
    /// persistently: only the bytes a given command actually covers are
    /// overwritten, so a short command's missing tail still reads back the
    /// previous longer command's bytes at the same offset.
    prev_cmd_data: [u8; 0x28],
    sent_96: bool,
    in_game: bool,
    menu: Vec<(u32, u32, String)>,
    pending_requests: Vec<RequestKey>,
    done_requests: HashSet<RequestKey>,
    open_files: HashMap<String, OpenFile>,
    current_game_config_index: usize,
    current_request: Option<RequestKey>,
    bin_complete: bool,
    dat_complete: bool,
    should_disconnect: bool,
    next_request_id: u64,
}

impl State {
    fn new(hardware_id: u32) -> Self {
        Self {
            hardware_id,
            guild_card_number: 0,
            client_config: Vec::new(),
            prev_cmd_data: [0u8; 0x28],
            sent_96: false,
            in_game: false,
            menu: Vec::new(),
            pending_requests: Vec::new(),
            done_requests: HashSet::new(),
            open_files: HashMap::new(),
            current_game_config_index: 0,
            current_request: None,
            bin_complete: false,
            dat_complete: false,
            should_disconnect: false,
            next_request_id: 1,
        }
    }
}

/// Drives one connection through the full quest-harvesting protocol.
pub struct DownloadSession<S> {
    config: Config,
    channel: Channel<S>,
    state: State,
}

impl<S> DownloadSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(config: Config, stream: S, hardware_id: u32) -> Self {
        let family = config.family;
        Self {
            config,
            channel: Channel::new(stream, family),
            state: State::new(hardware_id),
        }
    }

    pub fn channel_mut(&mut self) -> &mut Channel<S> {
        &mut self.channel
    }

    /// Runs the control loop to completion: either every applicable game
    /// config has been exhausted, or a cancel condition fired.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            if self.state.should_disconnect {
                return Ok(());
            }
            if self.state.current_game_config_index >= GAME_CONFIGS.len() {
                return Ok(());
            }

            let (opcode, flag, payload) = self.channel.recv().await?;
            if self.config.show_command_data {
                debug!(opcode = format!("{opcode:#04x}"), flag, data = %hex::encode(&payload), "recv");
            }
            self.on_message(opcode, flag, &payload).await?;
        }
    }

    async fn on_message(&mut self, opcode: u16, flag: u32, payload: &[u8]) -> Result<()> {
        let n = payload.len().min(self.state.prev_cmd_data.len());
        self.state.prev_cmd_data[..n].copy_from_slice(&payload[..n]);

        match opcode {
            opcodes::SERVER_INIT_V2
            | opcodes::SERVER_INIT_V3
            | opcodes::SERVER_INIT_V3_ALT
            | opcodes::SERVER_INIT_BB_A
            | opcodes::SERVER_INIT_BB_B => self.handle_server_init(opcode, payload).await,

            opcodes::LOGIN_V1
            | opcodes::LOGIN_V2
            | opcodes::REGISTER_ACK_V2
            | opcodes::LOGIN_GC
            | opcodes::LOGIN_GC_VERIFY_LICENSE => self.handle_authentication(opcode, flag).await,

            opcodes::UPDATE_CLIENT_CONFIG | opcodes::LOGIN_EXTENDED | opcodes::LOGIN_EXTENDED_ALT => {
                self.handle_config_reconcile(payload).await
            }

            opcodes::HEALTH_CHECK_97 | opcodes::HEALTH_CHECK_B1 | opcodes::HEALTH_CHECK_B2 => {
                self.handle_health_check(opcode).await
            }

            opcodes::SHIP_LIST | opcodes::BLOCK_LIST | opcodes::CHANGE_SHIP | opcodes::CHANGE_BLOCK => {
                self.handle_menu_navigation(payload).await
            }

            opcodes::LOBBY_JOIN | opcodes::LOBBY_ARROW_LIST | opcodes::GAME_JOIN => self.handle_lobby_join().await,

            opcodes::QUEST_LIST | opcodes::QUEST_LIST_ALT => self.handle_quest_list(payload).await,

            opcodes::OPEN_FILE | opcodes::OPEN_FILE_BB => self.handle_open_file(payload).await,
            opcodes::WRITE_FILE | opcodes::WRITE_FILE_BB => self.handle_write_file(flag, payload).await,

            opcodes::RECONNECT => self.handle_reconnect(payload).await,

            _ => {
                debug!(opcode = format!("{opcode:#04x}"), "ignoring unhandled command");
                Ok(())
            }
        }
    }

    async fn handle_server_init(&mut self, opcode: u16, payload: &[u8]) -> Result<()> {
        if payload.len() < 8 {
            return Err(CoreError::protocol("server init command too short"));
        }
        let recv_seed = u32::from_le_bytes(payload[0..4].try_into().unwrap());
        let send_seed = u32::from_le_bytes(payload[4..8].try_into().unwrap());

        let (recv, send): (Box<dyn PsoCipher + Send>, Box<dyn PsoCipher + Send>) = if self.config.family.uses_v4_cipher() {
            let key = self
                .config
                .bb_key_file
                .as_ref()
                .ok_or_else(|| CoreError::protocol("missing BB key file"))?;
            let mut seed_bytes = Vec::with_capacity(48);
            seed_bytes.extend_from_slice(&recv_seed.to_le_bytes());
            seed_bytes.extend_from_slice(&send_seed.to_le_bytes());
            seed_bytes.resize(48, 0);
            (
                Box::new(V4Cipher::new(key, &seed_bytes)?),
                Box::new(V4Cipher::new(key, &seed_bytes)?),
            )
        } else if self.config.family.uses_v3_cipher() {
            (
                Box::new(V3Cipher::with_endianness(recv_seed, self.config.family.cipher_big_endian())),
                Box::new(V3Cipher::with_endianness(send_seed, self.config.family.cipher_big_endian())),
            )
        } else if self.config.family.is_patch_server() {
            (Box::new(PatchCipher::new(recv_seed)), Box::new(PatchCipher::new(send_seed)))
        } else {
            (
                Box::new(V2Cipher::with_endianness(recv_seed, self.config.family.cipher_big_endian())),
                Box::new(V2Cipher::with_endianness(send_seed, self.config.family.cipher_big_endian())),
            )
        };
        self.channel.install_ciphers(recv, send);

        let login_opcode = match opcode {
            opcodes::SERVER_INIT_BB_A | opcodes::SERVER_INIT_BB_B => opcodes::LOGIN_EXTENDED,
            opcodes::SERVER_INIT_V3 | opcodes::SERVER_INIT_V3_ALT => opcodes::LOGIN_GC_VERIFY_LICENSE,
            _ if self.config.family.is_v1() => opcodes::LOGIN_V1,
            _ => opcodes::LOGIN_V2,
        };
        let body = self.build_login_body(false);
        self.channel.send(login_opcode, 0, &body).await
    }

    fn build_login_body(&self, registration: bool) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.state.hardware_id.to_le_bytes());
        body.push(self.config.language.0);
        body.push(registration as u8);
        match &self.config.credentials {
            Credentials::SerialAccessKey { serial_number, access_key } => {
                push_fixed_str(&mut body, serial_number, 16);
                push_fixed_str(&mut body, access_key, 16);
            }
            Credentials::UserPassword { username, password } => {
                push_fixed_str(&mut body, username, 32);
                push_fixed_str(&mut body, password, 32);
            }
            Credentials::Xbox { gamertag, user_id, account_id } => {
                push_fixed_str(&mut body, gamertag, 16);
                push_fixed_str(&mut body, user_id, 20);
                push_fixed_str(&mut body, account_id, 20);
            }
        }
        body
    }

    async fn handle_authentication(&mut self, opcode: u16, flag: u32) -> Result<()> {
        match flag {
            0 | 2 => {
                let body = self.build_login_body(false);
                let reply_opcode = match opcode {
                    opcodes::LOGIN_GC_VERIFY_LICENSE => opcodes::LOGIN_GC,
                    _ => opcodes::LOGIN_EXTENDED,
                };
                self.channel.send(reply_opcode, 0, &body).await
            }
            1 => {
                let body = self.build_login_body(true);
                let reply_opcode = match opcode {
                    opcodes::LOGIN_V2 => opcodes::REGISTER_ACK_V2,
                    _ => opcodes::LOGIN_GC,
                };
                self.channel.send(reply_opcode, 0, &body).await
            }
            _ => Err(CoreError::auth(format!("authentication failed, flag {flag}"))),
        }
    }

    async fn handle_config_reconcile(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() >= 4 {
            self.state.guild_card_number = u32::from_le_bytes(payload[0..4].try_into().unwrap());
        }
        if !self.config.family.is_v1_or_v2() {
            let mut config = vec![0u8; 0x20];
            for (z, slot) in config.iter_mut().enumerate() {
                let read_index = z + 8;
                *slot = if read_index < payload.len() {
                    payload[read_index]
                } else {
                    self.state.prev_cmd_data[read_index]
                };
            }
            self.state.client_config = config;
        }

        if !self.state.sent_96 {
            self.state.sent_96 = true;
            let snapshot = self.config.character_snapshot.clone();
            self.channel.send(opcodes::CHARACTER_DATA, 0, &snapshot).await?;
        }
        Ok(())
    }

    async fn handle_health_check(&mut self, opcode: u16) -> Result<()> {
        let reply = match opcode {
            opcodes::HEALTH_CHECK_B1 => opcodes::HEALTH_ACK_99,
            opcodes::HEALTH_CHECK_B2 => opcodes::HEALTH_ACK_B3,
            opcodes::HEALTH_CHECK_97 => opcodes::HEALTH_CHECK_B1,
            _ => return Ok(()),
        };
        self.channel.send(reply, 0, &[]).await
    }

    async fn handle_menu_navigation(&mut self, payload: &[u8]) -> Result<()> {
        self.state.menu.clear();
        for chunk in payload.chunks_exact(0x44) {
            let menu_id = u32::from_le_bytes(chunk[0..4].try_into().unwrap());
            let item_id = u32::from_le_bytes(chunk[4..8].try_into().unwrap());
            let name_bytes = &chunk[8..0x44];
            let nul = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
            let name = String::from_utf8_lossy(&name_bytes[..nul]).into_owned();
            self.state.menu.push((menu_id, item_id, name));
        }

        let chosen = self
            .state
            .menu
            .iter()
            .find(|(_, _, name)| self.config.ship_names.contains(&strip_color_codes(name)))
            .cloned();

        match chosen {
            Some((menu_id, item_id, _)) => {
                let mut body = Vec::with_capacity(8);
                body.extend_from_slice(&menu_id.to_le_bytes());
                body.extend_from_slice(&item_id.to_le_bytes());
                self.channel.send(opcodes::MENU_SELECTION, 0, &body).await
            }
            None if self.config.interactive => self.prompt_for_menu_choice().await,
            None => Err(CoreError::protocol("no configured ship matched the menu and interactive mode is off")),
        }
    }

    async fn prompt_for_menu_choice(&mut self) -> Result<()> {
        info!("no auto-selectable ship found; choices:");
        for (i, (_, _, name)) in self.state.menu.iter().enumerate() {
            info!("  [{i}] {}", strip_color_codes(name));
        }
        let mut reader = BufReader::new(tokio::io::stdin());
        let mut line = String::new();
        reader
            .read_line(&mut line)
            .await
            .map_err(|e| CoreError::transient(format!("stdin read failed: {e}")))?;
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("q") {
            self.state.should_disconnect = true;
            return Ok(());
        }
        if trimmed.eq_ignore_ascii_case("s") {
            self.advance_game_config();
            return Ok(());
        }
        let index: usize = trimmed
            .parse()
            .map_err(|_| CoreError::protocol("expected a menu index, 'q', or 's'"))?;
        let (menu_id, item_id, _) = *self
            .state
            .menu
            .get(index)
            .ok_or_else(|| CoreError::protocol("menu index out of range"))?;
        let mut body = Vec::with_capacity(8);
        body.extend_from_slice(&menu_id.to_le_bytes());
        body.extend_from_slice(&item_id.to_le_bytes());
        self.channel.send(opcodes::MENU_SELECTION, 0, &body).await
    }

    async fn handle_lobby_join(&mut self) -> Result<()> {
        if self.state.in_game {
            return Ok(());
        }
        self.state.in_game = true;
        let config = GAME_CONFIGS[self.state.current_game_config_index];
        let create_opcode = if self.config.family.is_v1() {
            opcodes::CREATE_GAME_V1
        } else {
            opcodes::CREATE_GAME
        };
        let name = format!("dl{:08x}", self.state.hardware_id);
        let password = format!("{:08x}", self.state.guild_card_number);
        let mut body = Vec::new();
        push_fixed_str(&mut body, &name, 16);
        push_fixed_str(&mut body, &password, 16);
        body.push(config.mode as u8);
        body.push(config.episode as u8);
        self.channel.send(create_opcode, 0, &body).await
    }

    async fn handle_quest_list(&mut self, payload: &[u8]) -> Result<()> {
        self.state.pending_requests.clear();
        for chunk in payload.chunks_exact(8) {
            let menu_id = u32::from_le_bytes(chunk[0..4].try_into().unwrap());
            let item_id = u32::from_le_bytes(chunk[4..8].try_into().unwrap());
            let key = RequestKey { menu_id, item_id };
            if !self.state.done_requests.contains(&key) {
                self.state.pending_requests.push(key);
            }
        }
        self.send_next_request().await
    }

    async fn send_next_request(&mut self) -> Result<()> {
        match self.state.pending_requests.pop() {
            Some(req) => {
                self.state.bin_complete = false;
                self.state.dat_complete = false;
                self.state.current_request = Some(req);
                let mut body = Vec::with_capacity(8);
                body.extend_from_slice(&req.menu_id.to_le_bytes());
                body.extend_from_slice(&req.item_id.to_le_bytes());
                self.channel.send(opcodes::MENU_SELECTION, 0, &body).await
            }
            None => {
                self.advance_game_config();
                Ok(())
            }
        }
    }

    fn advance_game_config(&mut self) {
        self.state.in_game = false;
        let mut next = self.state.current_game_config_index + 1;
        while next < GAME_CONFIGS.len() && !GAME_CONFIGS[next].applicable(self.config.family) {
            next += 1;
        }
        self.state.current_game_config_index = next;
    }

    async fn handle_open_file(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() < 0x14 {
            return Err(CoreError::protocol("open-file command too short"));
        }
        let expected_size = u32::from_le_bytes(payload[0..4].try_into().unwrap());
        let name_bytes = &payload[4..0x14];
        let nul = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        let internal_name = String::from_utf8_lossy(&name_bytes[..nul]).into_owned();
        self.state.open_files.insert(
            internal_name.clone(),
            OpenFile { internal_name, expected_size, data: Vec::new() },
        );
        Ok(())
    }

    async fn handle_write_file(&mut self, flag: u32, payload: &[u8]) -> Result<()> {
        if payload.len() < 0x14 {
            return Err(CoreError::protocol("write-file command too short"));
        }
        let name_bytes = &payload[0..0x10];
        let nul = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        let filename = String::from_utf8_lossy(&name_bytes[..nul]).into_owned();
        let chunk_size = u32::from_le_bytes(payload[0x10..0x14].try_into().unwrap()) as usize;
        let chunk = payload
            .get(0x14..0x14 + chunk_size)
            .ok_or_else(|| CoreError::protocol("write-file chunk exceeds payload"))?;

        let is_final = chunk_size != 1024;
        let request_id = self.state.next_request_id;

        let file = self
            .state
            .open_files
            .get_mut(&filename)
            .ok_or_else(|| CoreError::protocol("write-file for a file that was never opened"))?;
        file.data.extend_from_slice(chunk);

        if is_final {
            let file = self.state.open_files.remove(&filename).unwrap();
            self.state.next_request_id += 1;
            self.persist_file(&file, request_id)?;

            let is_bin = file.internal_name.ends_with(".bin");
            if is_bin {
                self.state.bin_complete = true;
            } else {
                self.state.dat_complete = true;
            }

            if !self.config.family.is_v1_or_v2() {
                self.channel.send(opcodes::QUEST_LOADING_READY, flag, &[]).await?;
            }

            if self.state.bin_complete && self.state.dat_complete {
                if let Some(key) = self.state.current_request.take() {
                    self.state.done_requests.insert(key);
                }
                for cmd in &self.config.on_complete_commands {
                    self.channel.send(opcodes::CHAT, 0, cmd.as_bytes()).await?;
                }
                self.send_next_request().await?;
            }
        }
        Ok(())
    }

    fn persist_file(&self, file: &OpenFile, request_id: u64) -> Result<()> {
        if file.data.len() as u32 != file.expected_size {
            warn!(
                name = file.internal_name,
                expected = file.expected_size,
                got = file.data.len(),
                "downloaded file size mismatch"
            );
        }
        let epoch_us = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_micros())
            .unwrap_or(0);
        let filename = format!(
            "{}_{}_{:?}_{}_{}",
            request_id,
            epoch_us,
            self.config.family,
            self.config.language.char_tag(),
            sanitise_filename(&file.internal_name)
        );
        let path = self.config.output_dir.join(filename);
        std::fs::write(&path, &file.data)
            .map_err(|e| CoreError::transient(format!("failed to write {}: {e}", path.display())))
    }

    async fn handle_reconnect(&mut self, _payload: &[u8]) -> Result<()> {
        // A genuine redirect to a new host requires tearing down this
        // socket and opening another; reproduced by the caller, which
        // owns the underlying `S` and can swap it. This core only signals
        // the need by returning a protocol error distinguishable from a
        // hard failure.
        Err(CoreError::protocol("server issued an unexpected redirect"))
    }
}

fn push_fixed_str(out: &mut Vec<u8>, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    out.extend_from_slice(&bytes[..n]);
    out.resize(out.len() + (width - n), 0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::decode_header as test_decode_header;
    use tokio::io::AsyncWriteExt;

    fn base_config(ship_names: &[&str]) -> Config {
        Config::new(
            "localhost:9100".into(),
            std::env::temp_dir(),
            ClientFamily::PcV2,
            LanguageCode::ENGLISH,
            None,
            Credentials::SerialAccessKey { serial_number: "SERIAL".into(), access_key: "ACCESS".into() },
            vec![0u8; 4],
            ship_names.iter().map(|s| s.to_string()).collect(),
            Vec::new(),
            false,
            false,
        )
        .unwrap()
    }

    #[test]
    fn construction_rejects_mismatched_credentials() {
        let result = Config::new(
            "h:1".into(),
            std::env::temp_dir(),
            ClientFamily::XbV3,
            LanguageCode::ENGLISH,
            None,
            Credentials::SerialAccessKey { serial_number: "x".into(), access_key: "y".into() },
            Vec::new(),
            HashSet::new(),
            Vec::new(),
            false,
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn construction_rejects_missing_bb_key_file() {
        let result = Config::new(
            "h:1".into(),
            std::env::temp_dir(),
            ClientFamily::BbV4,
            LanguageCode::ENGLISH,
            None,
            Credentials::UserPassword { username: "u".into(), password: "p".into() },
            Vec::new(),
            HashSet::new(),
            Vec::new(),
            false,
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn strips_color_codes() {
        assert_eq!(strip_color_codes("\tCShip 1"), "Ship 1");
    }

    #[test]
    fn game_configs_skip_inapplicable_entries_for_v1() {
        let applicable: Vec<_> = GAME_CONFIGS.iter().filter(|c| c.applicable(ClientFamily::DcV1)).collect();
        // only the two v1_ok entries (Normal/Ep1, Battle/Ep1)
        assert_eq!(applicable.len(), 2);
    }

    // Scenario E: the session auto-picks a configured ship name from the
    // menu without prompting.
    #[tokio::test]
    async fn scenario_e_ship_select_auto_pick() {
        let (client, mut server) = tokio::io::duplex(8192);
        let config = base_config(&["Ship 1"]);
        let mut session = DownloadSession::new(config, client, 0xAABBCCDD);

        tokio::spawn(async move {
            let mut payload = Vec::new();
            payload.extend_from_slice(&1u32.to_le_bytes());
            payload.extend_from_slice(&2u32.to_le_bytes());
            let mut name = vec![0u8; 0x3C];
            name[..6].copy_from_slice(b"Ship 1");
            payload.extend_from_slice(&name);

            let mut frame = crate::framing::encode_header(
                crate::family::HeaderKind::Pc,
                opcodes::SHIP_LIST,
                0,
                (4 + payload.len()) as u16,
            );
            frame.extend_from_slice(&payload);
            server.write_all(&frame).await.unwrap();

            let mut header = [0u8; 4];
            tokio::io::AsyncReadExt::read_exact(&mut server, &mut header).await.unwrap();
            let (opcode, _flag, size) = test_decode_header(crate::family::HeaderKind::Pc, &header);
            assert_eq!(opcode, opcodes::MENU_SELECTION);
            let mut body = vec![0u8; size as usize - 4];
            tokio::io::AsyncReadExt::read_exact(&mut server, &mut body).await.unwrap();
            assert_eq!(u32::from_le_bytes(body[0..4].try_into().unwrap()), 1);
            assert_eq!(u32::from_le_bytes(body[4..8].try_into().unwrap()), 2);
        });

        let (opcode, flag, payload) = session.channel_mut().recv().await.unwrap();
        session.on_message(opcode, flag, &payload).await.unwrap();
    }

    // Scenario F: a quest download is interrupted after the .bin half
    // completes; the session must not treat the quest as done.
    #[tokio::test]
    async fn scenario_f_interrupted_quest_download() {
        let (client, _server) = tokio::io::duplex(8192);
        let config = base_config(&[]);
        let mut session = DownloadSession::new(config, client, 1);

        let mut open_payload = vec![0u8; 0x14];
        open_payload[0..4].copy_from_slice(&3u32.to_le_bytes());
        open_payload[4..12].copy_from_slice(b"quest.bin");
        session.handle_open_file(&open_payload).await.unwrap();

        let mut write_payload = vec![0u8; 0x14 + 3];
        write_payload[0..9].copy_from_slice(b"quest.bin");
        write_payload[0x10..0x14].copy_from_slice(&3u32.to_le_bytes());
        write_payload[0x14..0x17].copy_from_slice(b"abc");
        session.handle_write_file(0, &write_payload).await.unwrap();

        assert!(session.state.bin_complete);
        assert!(!session.state.dat_complete);
        assert!(session.state.open_files.is_empty());
    }

    // A short config-reconcile command (just the guild card number) must
    // not zero out the rest of client_config; missing bytes fall back to
    // the previous command's cleartext at the same offset.
    #[tokio::test]
    async fn config_reconcile_short_payload_falls_back_to_previous_command() {
        let (client, _server) = tokio::io::duplex(8192);
        let config = Config::new(
            "localhost:9100".into(),
            std::env::temp_dir(),
            ClientFamily::GcV3,
            LanguageCode::ENGLISH,
            None,
            Credentials::SerialAccessKey { serial_number: "SERIAL".into(), access_key: "ACCESS".into() },
            Vec::new(),
            HashSet::new(),
            Vec::new(),
            false,
            false,
        )
        .unwrap();
        let mut session = DownloadSession::new(config, client, 1);

        let mut full = vec![0u8; 0x28];
        for (i, b) in full[8..0x28].iter_mut().enumerate() {
            *b = i as u8;
        }
        session.on_message(opcodes::UPDATE_CLIENT_CONFIG, 0, &full).await.unwrap();
        assert_eq!(session.state.client_config[0], 0);
        assert_eq!(session.state.client_config[0x1F], 0x1F);

        let mut short = vec![0u8; 4];
        short[0..4].copy_from_slice(&99u32.to_le_bytes());
        session.on_message(opcodes::UPDATE_CLIENT_CONFIG, 0, &short).await.unwrap();
        assert_eq!(session.state.guild_card_number, 99);
        assert_eq!(session.state.client_config[0], 0);
        assert_eq!(session.state.client_config[0x1F], 0x1F);
    }
}
