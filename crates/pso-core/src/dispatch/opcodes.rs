//! Named opcodes for the representative command set this core recognises.
//!
//! Values are the low byte used to index a family's handler table; several
//! families reuse the same semantic command at different numeric opcodes
//! (e.g. login is `0x93` on some families, `0x9A`/`0x9D`/`0x9E`/`0xDB` on
//! others), so these constants name the *numeric* opcode, not the command.

pub const SERVER_INIT_V2: u16 = 0x02;
pub const SERVER_INIT_V3: u16 = 0x17;
pub const SERVER_INIT_BB_A: u16 = 0x03;
pub const SERVER_INIT_BB_B: u16 = 0x9B;
pub const SERVER_INIT_V3_ALT: u16 = 0x91;

pub const UPDATE_CLIENT_CONFIG: u16 = 0x04;
pub const CHAT: u16 = 0x06;
pub const GAME_LIST_REQUEST: u16 = 0x08;
pub const MENU_ITEM_INFO: u16 = 0x09;
pub const MENU_SELECTION: u16 = 0x10;
pub const WRITE_FILE: u16 = 0x13;
pub const WRITE_FILE_BB: u16 = 0xA7;
pub const RECONNECT: u16 = 0x19;
pub const OPEN_FILE: u16 = 0x44;
pub const OPEN_FILE_BB: u16 = 0xA6;
pub const PLAYER_DATA: u16 = 0x61;
pub const PLAYER_DATA_BB: u16 = 0x98;
pub const CHANGE_LOBBY: u16 = 0x84;
pub const ARROW_UPDATE: u16 = 0x88;
pub const LOGIN_V2: u16 = 0x93;
pub const LOGIN_GC_VERIFY_LICENSE: u16 = 0x9A;
pub const LOGIN_GC: u16 = 0x9C;
pub const LOGIN_EXTENDED: u16 = 0x9D;
pub const LOGIN_EXTENDED_ALT: u16 = 0x9E;
pub const LOGIN_XB: u16 = 0xDB;
pub const CHANGE_SHIP: u16 = 0xA0;
pub const CHANGE_BLOCK: u16 = 0xA1;
pub const QUEST_LIST: u16 = 0xA2;
pub const QUEST_LIST_ALT: u16 = 0xA4;
pub const QUEST_LOADING_READY: u16 = 0xAC;
pub const CREATE_GAME: u16 = 0xC1;
pub const CREATE_GAME_V1: u16 = 0x0C;
pub const CREATE_GAME_EP3: u16 = 0xEC;
pub const MESSAGE_BOX_CLOSED: u16 = 0xD6;

// Commands the download session issues as a client, or receives in reply.
pub const LOGIN_V1: u16 = 0x90;
pub const REGISTER_ACK_V2: u16 = 0x92;
pub const CHARACTER_DATA: u16 = 0x96;
pub const HEALTH_CHECK_97: u16 = 0x97;
pub const HEALTH_CHECK_B1: u16 = 0xB1;
pub const HEALTH_CHECK_B2: u16 = 0xB2;
pub const HEALTH_ACK_99: u16 = 0x99;
pub const HEALTH_ACK_B3: u16 = 0xB3;
pub const SHIP_LIST: u16 = 0x07;
pub const BLOCK_LIST: u16 = 0x1F;
pub const LOBBY_JOIN: u16 = 0x67;
pub const LOBBY_ARROW_LIST: u16 = 0x83;
pub const GAME_JOIN: u16 = 0x64;
