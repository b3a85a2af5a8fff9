//! The command dispatcher: per-family opcode tables, size-band
//! enforcement, and the session state those handlers mutate.
//!
//! Tables are built once via [`std::sync::OnceLock`] and never mutated
//! afterwards; no locking is needed since no state is shared across
//! connections.

pub mod opcodes;

use std::sync::OnceLock;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::cipher::{KeyFile, PatchCipher, PsoCipher, V2Cipher, V3Cipher, V4Cipher};
use crate::error::{CoreError, Result};
use crate::family::{ClientFamily, LanguageCode};
use crate::framing::Channel;

/// Per-connection state the dispatcher mutates. Deliberately thin: the
/// lobby/game object model itself is out of scope for this core.
pub struct Session {
    pub family: ClientFamily,
    pub language: LanguageCode,
    pub guild_card_number: u32,
    /// Opaque 0x20-byte blob round-tripped through the client on
    /// reconnects.
    pub client_config: [u8; 0x20],
    pub lobby_id: u32,
    pub game_id: u32,
    pub loading: bool,
    pub in_game: bool,
    pub authenticated: bool,
    pub disconnected: bool,
    /// Key file for BB's v4 cipher; `None` for every other family.
    pub bb_key_file: Option<KeyFile>,
    /// The first 0x28 bytes of the most recently received command, kept
    /// persistently: only the bytes a given command actually covers are
    /// overwritten, so a short command's missing tail still reads back the
    /// previous longer command's bytes at the same offset.
    prev_cmd_data: [u8; 0x28],
    /// Set by the server-init handler; the caller installs these on its
    /// `Channel` after `process` returns and clears the slot.
    pending_ciphers: Option<(Box<dyn PsoCipher + Send>, Box<dyn PsoCipher + Send>)>,
}

impl Session {
    pub fn new(family: ClientFamily, language: LanguageCode) -> Self {
        Self {
            family,
            language,
            guild_card_number: 0,
            client_config: [0u8; 0x20],
            lobby_id: 0,
            game_id: 0,
            loading: false,
            in_game: false,
            authenticated: false,
            disconnected: false,
            bb_key_file: None,
            prev_cmd_data: [0u8; 0x28],
            pending_ciphers: None,
        }
    }
}

/// A handler is a plain synchronous function: it must not block and must
/// never `.await`. Outbound replies are the caller's responsibility to
/// flush via the channel after `process` returns.
pub type HandlerFn = fn(&mut Session, u16, u32, &[u8]) -> Result<Vec<(u16, u32, Vec<u8>)>>;

#[derive(Clone, Copy)]
pub enum Slot {
    Handler(HandlerFn),
    /// Accept and drop: a recognised but intentionally inert command.
    Noop,
    /// No handler registered: log and disconnect.
    Unimplemented,
}

pub struct HandlerTable {
    slots: [Slot; 256],
}

impl HandlerTable {
    pub fn empty() -> Self {
        Self {
            slots: [Slot::Unimplemented; 256],
        }
    }

    pub fn set(&mut self, opcode: u16, slot: Slot) {
        self.slots[(opcode & 0xFF) as usize] = slot;
    }

    pub fn get(&self, opcode: u16) -> Slot {
        self.slots[(opcode & 0xFF) as usize]
    }
}

/// Verifies a payload falls within `[min, max]` bytes. Variable-length
/// commands pass `max = 0xFFFF`.
pub fn check_size(received: usize, min: usize, max: usize) -> Result<()> {
    if received < min {
        return Err(CoreError::protocol(format!(
            "payload too small: {received} bytes, need at least {min}"
        )));
    }
    if received > max {
        return Err(CoreError::protocol(format!(
            "payload too large: {received} bytes, max {max}"
        )));
    }
    Ok(())
}

/// Top-level dispatch: look up the handler, invoke it, install any ciphers
/// the handler requested on `channel`, and translate a handler error into
/// "the caller should disconnect". Never panics on a handler error.
pub fn process<S>(
    table: &HandlerTable,
    session: &mut Session,
    channel: &mut Channel<S>,
    opcode: u16,
    flag: u32,
    payload: &[u8],
) -> Result<Vec<(u16, u32, Vec<u8>)>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    debug!(
        opcode = format!("{opcode:#04x}"),
        flag,
        size = payload.len(),
        data = %hex::encode(payload),
        "received command"
    );

    let n = payload.len().min(session.prev_cmd_data.len());
    session.prev_cmd_data[..n].copy_from_slice(&payload[..n]);

    let result = match table.get(opcode) {
        Slot::Handler(f) => f(session, opcode, flag, payload).map_err(|e| {
            warn!(opcode = format!("{opcode:#04x}"), error = %e, "handler failed");
            e
        }),
        Slot::Noop => Ok(Vec::new()),
        Slot::Unimplemented => {
            warn!(opcode = format!("{opcode:#04x}"), "no handler registered; disconnecting");
            Err(CoreError::protocol(format!("unhandled opcode {opcode:#04x}")))
        }
    };

    if let Some((recv, send)) = session.pending_ciphers.take() {
        channel.install_ciphers(recv, send);
    }

    result
}

/// Rewrites the guild-card number embedded in a command's payload, for use
/// when this core acts as a proxy between a real server and a client. Only
/// the representative set of commands that are known to embed a guild
/// card number at a fixed offset are rewritten; all others are left
/// untouched.
pub fn rewrite_guild_card_number(opcode: u16, payload: &mut [u8], translate: impl Fn(u32) -> u32) -> Result<()> {
    let offset = match opcode {
        opcodes::PLAYER_DATA | opcodes::PLAYER_DATA_BB => 0,
        opcodes::UPDATE_CLIENT_CONFIG => 4,
        _ => return Ok(()),
    };

    if payload.len() < offset + 4 {
        return Err(CoreError::protocol("payload too small for guild card rewrite"));
    }
    let raw = u32::from_le_bytes(payload[offset..offset + 4].try_into().unwrap());
    let rewritten = translate(raw);
    payload[offset..offset + 4].copy_from_slice(&rewritten.to_le_bytes());
    Ok(())
}

/// The 4-byte "just the guild card number" form and the full 0x28-byte form
/// both arrive under this opcode. For the short form, bytes the current
/// payload doesn't cover fall back byte-for-byte to the same offset in the
/// previous received command's cleartext, tracked in `session.prev_cmd_data`.
fn handle_update_client_config(session: &mut Session, _opcode: u16, _flag: u32, payload: &[u8]) -> Result<Vec<(u16, u32, Vec<u8>)>> {
    check_size(payload.len(), 0x08, 0x28)?;
    session.guild_card_number = u32::from_le_bytes(payload[0..4].try_into().unwrap());
    if !session.family.is_v1_or_v2() {
        for z in 0..0x20 {
            let read_index = z + 8;
            session.client_config[z] = if read_index < payload.len() {
                payload[read_index]
            } else {
                session.prev_cmd_data[read_index]
            };
        }
    }
    Ok(Vec::new())
}

/// Installs the cipher pair a server-init command (0x02/0x17/0x91/0x9B for
/// v2/v3/patch families, 0x03/0x9B for BB) announces, by staging it on
/// `session.pending_ciphers` for `process` to hand to the channel.
fn handle_server_init(session: &mut Session, _opcode: u16, _flag: u32, payload: &[u8]) -> Result<Vec<(u16, u32, Vec<u8>)>> {
    check_size(payload.len(), 8, 0xFFFF)?;
    let recv_seed = u32::from_le_bytes(payload[0..4].try_into().unwrap());
    let send_seed = u32::from_le_bytes(payload[4..8].try_into().unwrap());

    let (recv, send): (Box<dyn PsoCipher + Send>, Box<dyn PsoCipher + Send>) = if session.family.uses_v4_cipher() {
        let key = session
            .bb_key_file
            .as_ref()
            .ok_or_else(|| CoreError::protocol("missing BB key file"))?;
        let mut seed_bytes = Vec::with_capacity(48);
        seed_bytes.extend_from_slice(&recv_seed.to_le_bytes());
        seed_bytes.extend_from_slice(&send_seed.to_le_bytes());
        seed_bytes.resize(48, 0);
        (Box::new(V4Cipher::new(key, &seed_bytes)?), Box::new(V4Cipher::new(key, &seed_bytes)?))
    } else if session.family.uses_v3_cipher() {
        (
            Box::new(V3Cipher::with_endianness(recv_seed, session.family.cipher_big_endian())),
            Box::new(V3Cipher::with_endianness(send_seed, session.family.cipher_big_endian())),
        )
    } else if session.family.is_patch_server() {
        (Box::new(PatchCipher::new(recv_seed)), Box::new(PatchCipher::new(send_seed)))
    } else {
        (
            Box::new(V2Cipher::with_endianness(recv_seed, session.family.cipher_big_endian())),
            Box::new(V2Cipher::with_endianness(send_seed, session.family.cipher_big_endian())),
        )
    };
    session.pending_ciphers = Some((recv, send));
    Ok(Vec::new())
}

fn handle_chat(_session: &mut Session, _opcode: u16, _flag: u32, payload: &[u8]) -> Result<Vec<(u16, u32, Vec<u8>)>> {
    check_size(payload.len(), 4, 0xFFFF)?;
    Ok(Vec::new())
}

fn handle_menu_selection(_session: &mut Session, _opcode: u16, _flag: u32, payload: &[u8]) -> Result<Vec<(u16, u32, Vec<u8>)>> {
    check_size(payload.len(), 8, 0xFFFF)?;
    Ok(Vec::new())
}

fn handle_message_box_closed(_session: &mut Session, _opcode: u16, _flag: u32, payload: &[u8]) -> Result<Vec<(u16, u32, Vec<u8>)>> {
    check_size(payload.len(), 0, 0)?;
    Ok(Vec::new())
}

fn handle_change_lobby(session: &mut Session, _opcode: u16, _flag: u32, payload: &[u8]) -> Result<Vec<(u16, u32, Vec<u8>)>> {
    check_size(payload.len(), 4, 4)?;
    session.lobby_id = u32::from_le_bytes(payload[0..4].try_into().unwrap());
    Ok(Vec::new())
}

fn handle_quest_loading_ready(session: &mut Session, _opcode: u16, _flag: u32, payload: &[u8]) -> Result<Vec<(u16, u32, Vec<u8>)>> {
    check_size(payload.len(), 0, 0)?;
    session.loading = false;
    Ok(Vec::new())
}

fn install_server_init_opcodes(table: &mut HandlerTable) {
    table.set(opcodes::SERVER_INIT_V2, Slot::Handler(handle_server_init));
    table.set(opcodes::SERVER_INIT_V3, Slot::Handler(handle_server_init));
    table.set(opcodes::SERVER_INIT_V3_ALT, Slot::Handler(handle_server_init));
    table.set(opcodes::SERVER_INIT_BB_A, Slot::Handler(handle_server_init));
    table.set(opcodes::SERVER_INIT_BB_B, Slot::Handler(handle_server_init));
}

fn base_table() -> HandlerTable {
    let mut table = HandlerTable::empty();
    install_server_init_opcodes(&mut table);
    table.set(opcodes::UPDATE_CLIENT_CONFIG, Slot::Handler(handle_update_client_config));
    table.set(opcodes::CHAT, Slot::Handler(handle_chat));
    table.set(opcodes::MENU_SELECTION, Slot::Handler(handle_menu_selection));
    table.set(opcodes::MESSAGE_BOX_CLOSED, Slot::Handler(handle_message_box_closed));
    table.set(opcodes::CHANGE_LOBBY, Slot::Handler(handle_change_lobby));
    table.set(opcodes::QUEST_LOADING_READY, Slot::Handler(handle_quest_loading_ready));
    table.set(opcodes::ARROW_UPDATE, Slot::Noop);
    table.set(opcodes::MENU_ITEM_INFO, Slot::Noop);
    table.set(opcodes::GAME_LIST_REQUEST, Slot::Noop);
    table
}

/// The patch-server table: a distinguished table from the game table, per
/// family predicate `is_patch_server`. Patch servers speak a much smaller
/// opcode space (handshake, directory navigation, file transfer); only the
/// handshake is shared with the game protocol today.
fn patch_table() -> HandlerTable {
    let mut table = HandlerTable::empty();
    install_server_init_opcodes(&mut table);
    table
}

/// Returns the read-only handler table for `family`, building it on first
/// use. Episode 3's card-battle opcodes (`0xBA`, `0xB4`, `0xCA`, ...) are
/// left `Unimplemented` for every family: this is a server, not a proxy,
/// and the card-battle simulator is out of scope.
pub fn table_for(family: ClientFamily) -> &'static HandlerTable {
    static TABLES: OnceLock<std::collections::HashMap<ClientFamily, HandlerTable>> = OnceLock::new();
    let tables = TABLES.get_or_init(|| {
        use ClientFamily::*;
        let game_families = [
            DcNte, Dc112000, DcV1, DcV2, PcNte, PcV2, GcNte, GcV3, GcEp3Nte, GcEp3, XbV3, BbV4,
        ];
        let mut tables: std::collections::HashMap<ClientFamily, HandlerTable> =
            game_families.into_iter().map(|f| (f, base_table())).collect();
        tables.insert(PatchPc, patch_table());
        tables.insert(PatchBb, patch_table());
        tables
    });
    tables
        .get(&family)
        .unwrap_or_else(|| tables.get(&ClientFamily::PcV2).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_size_enforces_band() {
        assert!(check_size(10, 4, 20).is_ok());
        assert!(check_size(2, 4, 20).is_err());
        assert!(check_size(21, 4, 20).is_err());
    }

    fn test_channel() -> Channel<tokio::io::DuplexStream> {
        let (a, _b) = tokio::io::duplex(4096);
        Channel::new(a, ClientFamily::PcV2)
    }

    #[tokio::test]
    async fn unregistered_opcode_disconnects() {
        let table = table_for(ClientFamily::PcV2);
        let mut session = Session::new(ClientFamily::PcV2, LanguageCode::ENGLISH);
        let mut channel = test_channel();
        let result = process(table, &mut session, &mut channel, 0xBA, 0, &[]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn client_config_handler_updates_session() {
        let table = table_for(ClientFamily::PcV2);
        let mut session = Session::new(ClientFamily::PcV2, LanguageCode::ENGLISH);
        let mut channel = test_channel();
        let mut payload = vec![0u8; 0x28];
        payload[0..4].copy_from_slice(&0xDEADBEEFu32.to_le_bytes());
        let result = process(table, &mut session, &mut channel, opcodes::UPDATE_CLIENT_CONFIG, 0, &payload);
        assert!(result.is_ok());
        assert_eq!(session.guild_card_number, 0xDEADBEEF);
    }

    #[tokio::test]
    async fn client_config_short_payload_falls_back_to_previous_command() {
        let table = table_for(ClientFamily::GcV3);
        let mut session = Session::new(ClientFamily::GcV3, LanguageCode::ENGLISH);
        let mut channel = Channel::new(tokio::io::duplex(4096).0, ClientFamily::GcV3);

        // First, a full-size command establishes a known client_config tail.
        let mut full = vec![0u8; 0x28];
        for (i, b) in full[8..0x28].iter_mut().enumerate() {
            *b = i as u8;
        }
        process(table, &mut session, &mut channel, opcodes::UPDATE_CLIENT_CONFIG, 0, &full).unwrap();
        assert_eq!(session.client_config, {
            let mut expect = [0u8; 0x20];
            for (i, b) in expect.iter_mut().enumerate() {
                *b = i as u8;
            }
            expect
        });

        // Then a short 8-byte command (just the guild card number) must not
        // stomp the rest of client_config with zeros.
        let mut short = vec![0u8; 8];
        short[0..4].copy_from_slice(&7u32.to_le_bytes());
        process(table, &mut session, &mut channel, opcodes::UPDATE_CLIENT_CONFIG, 0, &short).unwrap();
        assert_eq!(session.guild_card_number, 7);
        assert_eq!(session.client_config[0], 0);
        assert_eq!(session.client_config[1], 1);
        assert_eq!(session.client_config[0x1F], 0x1F);
    }

    #[tokio::test]
    async fn server_init_installs_ciphers_on_channel() {
        let table = table_for(ClientFamily::PcV2);
        let mut session = Session::new(ClientFamily::PcV2, LanguageCode::ENGLISH);
        let mut channel = test_channel();
        assert!(!channel.is_encrypted());

        let mut payload = vec![0u8; 8];
        payload[0..4].copy_from_slice(&0x1111u32.to_le_bytes());
        payload[4..8].copy_from_slice(&0x2222u32.to_le_bytes());
        process(table, &mut session, &mut channel, opcodes::SERVER_INIT_V2, 0, &payload).unwrap();
        assert!(channel.is_encrypted());
    }

    #[tokio::test]
    async fn patch_table_is_distinct_from_game_table() {
        let patch = table_for(ClientFamily::PatchPc);
        let game = table_for(ClientFamily::PcV2);
        assert!(matches!(patch.get(opcodes::CHAT), Slot::Unimplemented));
        assert!(matches!(game.get(opcodes::CHAT), Slot::Handler(_)));
    }

    #[test]
    fn guild_card_rewrite_translates_known_offset() {
        let mut payload = vec![0u8; 8];
        payload[0..4].copy_from_slice(&100u32.to_le_bytes());
        rewrite_guild_card_number(opcodes::PLAYER_DATA, &mut payload, |n| n + 1).unwrap();
        assert_eq!(u32::from_le_bytes(payload[0..4].try_into().unwrap()), 101);
    }

    #[test]
    fn guild_card_rewrite_is_noop_for_unknown_opcode() {
        let mut payload = vec![1, 2, 3, 4];
        let original = payload.clone();
        rewrite_guild_card_number(opcodes::CHAT, &mut payload, |n| n + 1).unwrap();
        assert_eq!(payload, original);
    }
}
