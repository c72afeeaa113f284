//! End-to-end engine tests: schema + mock process image + field API.

use courtside_core::config::DiscoveryTuning;
use courtside_core::discover::encode_marker;
use courtside_core::{
    FieldValue, MockMemory, ReadMemory, RosterEngine, SchemaIndex, SchemaRepository, TableKind,
    WriteMemory,
};

const MODULE_BASE: u64 = 0x1_4000_0000;
const PLAYER_BASE: u64 = 0x2_0000_0000;
const TEAM_BASE: u64 = 0x2_4000_0000;
const PLAYER_STRIDE: u64 = 1176;
const TEAM_STRIDE: u64 = 5672;
const TEAM_NAME_OFFSET: usize = 0x2E2;

const TEAMS: [&str; 10] = [
    "76ers",
    "Bucks",
    "Bulls",
    "Cavaliers",
    "Celtics",
    "Clippers",
    "Grizzlies",
    "Hawks",
    "Heat",
    "Hornets",
];

fn schema() -> SchemaIndex {
    let doc = r#"{
        "versions": {
            "2K26": {
                "game_info": { "playerSize": 1176, "teamSize": 5672, "staffSize": 1176, "stadiumSize": 800 },
                "base_pointers": {
                    "Player": [{ "rva": "0x1000", "finalOffset": 0 }]
                }
            }
        },
        "offsets": [
            { "category": "Vitals", "name": "First Name",
              "versions": { "2K26": { "offset": "0x28", "length": 20, "type": "wstring" } } },
            { "category": "Vitals", "name": "Last Name",
              "versions": { "2K26": { "offset": "0x0", "length": 20, "type": "wstring" } } },
            { "category": "Vitals", "name": "Height",
              "versions": { "2K26": { "offset": 90, "length": 16, "type": "integer" } } },
            { "category": "Vitals", "name": "Current Team",
              "versions": { "2K26": { "offset": 96, "length": 64, "type": "pointer" } } },
            { "category": "Attributes", "name": "Three Point",
              "versions": { "2K26": { "offset": 140, "startBit": 3, "length": 8, "type": "integer" } } },
            { "category": "Team Vitals", "name": "Team Name",
              "versions": { "2K26": { "offset": 738, "length": 24, "type": "wstring" } } }
        ]
    }"#;
    SchemaRepository::load_str(doc, "2K26").unwrap()
}

fn place_wide(image: &mut [u8], offset: usize, text: &str) {
    let marker = encode_marker(text);
    image[offset..offset + marker.len()].copy_from_slice(&marker);
}

fn player_table() -> Vec<u8> {
    let roster = [
        ("Joel", "Embiid"),
        ("Tyrese", "Maxey"),
        ("Paul", "George"),
        ("Victor", "Wembanyama"),
    ];
    let mut image = vec![0u8; 32 * PLAYER_STRIDE as usize];
    for (slot, (first, last)) in roster.iter().enumerate() {
        let record = slot * PLAYER_STRIDE as usize;
        place_wide(&mut image, record, last);
        place_wide(&mut image, record + 0x28, first);
    }
    image
}

fn team_table() -> Vec<u8> {
    let mut image = vec![0u8; 12 * TEAM_STRIDE as usize];
    for (slot, name) in TEAMS.iter().enumerate() {
        place_wide(&mut image, slot * TEAM_STRIDE as usize + TEAM_NAME_OFFSET, name);
    }
    image
}

fn mock_process(player_chain_target: u64) -> MockMemory {
    let mut module = vec![0u8; 0x2000];
    module[0x1000..0x1008].copy_from_slice(&player_chain_target.to_le_bytes());
    MockMemory::builder()
        .module(MODULE_BASE, 0x2000)
        .segment(MODULE_BASE, module)
        .segment(PLAYER_BASE, player_table())
        .segment(TEAM_BASE, team_table())
        .build()
}

fn engine() -> RosterEngine<MockMemory> {
    RosterEngine::new(mock_process(PLAYER_BASE), schema())
}

#[test]
fn reads_fields_through_pointer_chain() {
    let mut engine = engine();
    assert_eq!(engine.resolve_table_base(TableKind::Player), Some(PLAYER_BASE));
    assert_eq!(
        engine.get(TableKind::Player, 1, "Vitals", "Last Name"),
        Some(FieldValue::Text("Maxey".into()))
    );
    assert_eq!(
        engine.get(TableKind::Player, 3, "Vitals", "First Name"),
        Some(FieldValue::Text("Victor".into()))
    );
}

#[test]
fn bitfield_write_round_trips_and_preserves_neighbors() {
    let mut engine = engine();
    let record = PLAYER_BASE + 2 * PLAYER_STRIDE;
    engine
        .memory()
        .write_bytes(record + 139, &[0x55, 0x55, 0x55, 0x55])
        .unwrap();

    assert!(engine.set(
        TableKind::Player,
        2,
        "Attributes",
        "Three Point",
        &FieldValue::Integer(27)
    ));
    assert_eq!(
        engine.get(TableKind::Player, 2, "Attributes", "Three Point"),
        Some(FieldValue::Integer(27))
    );

    // The span is bytes 140..142; 139 and 142 keep their sentinels.
    let around = engine.memory().read_bytes(record + 139, 4).unwrap();
    assert_eq!(around[0], 0x55);
    assert_eq!(around[3], 0x55);
}

#[test]
fn unknown_fields_and_bad_indices_fail_soft() {
    let mut engine = engine();
    assert_eq!(
        engine.get(TableKind::Player, 0, "Vitals", "Wingspan"),
        None
    );
    assert!(!engine.set(
        TableKind::Player,
        0,
        "Vitals",
        "Wingspan",
        &FieldValue::Integer(1)
    ));
    // Index past the table cap.
    assert_eq!(engine.get(TableKind::Player, 6000, "Vitals", "Last Name"), None);
    // Oversized text writes fail without touching memory.
    assert!(!engine.set(
        TableKind::Player,
        1,
        "Vitals",
        "Last Name",
        &FieldValue::Text("A name far longer than twenty characters".into())
    ));
    assert_eq!(
        engine.get(TableKind::Player, 1, "Vitals", "Last Name"),
        Some(FieldValue::Text("Maxey".into()))
    );
}

#[test]
fn broken_chain_falls_back_to_discovery() {
    // Chain resolves into unmapped memory, so the probe rejects it.
    let mut engine = RosterEngine::new(mock_process(0x6_0000_0000), schema());
    assert_eq!(engine.resolve_table_base(TableKind::Player), None);

    engine.set_tuning(
        TableKind::Player,
        DiscoveryTuning {
            vote_threshold: 2,
            back_window: 600,
        },
    );
    let report = engine.run_discovery(TableKind::Player).unwrap();
    assert_eq!(report.chosen, Some(PLAYER_BASE));

    assert_eq!(
        engine.get(TableKind::Player, 0, "Vitals", "Last Name"),
        Some(FieldValue::Text("Embiid".into()))
    );
}

#[test]
fn team_sequence_discovery_and_back_reference_rendering() {
    let mut engine = engine();
    // No chain is configured for teams.
    assert_eq!(engine.resolve_table_base(TableKind::Team), None);

    let report = engine.run_discovery(TableKind::Team).unwrap();
    assert_eq!(report.chosen, Some(TEAM_BASE));
    assert_eq!(
        engine.get(TableKind::Team, 4, "Team Vitals", "Team Name"),
        Some(FieldValue::Text("Celtics".into()))
    );

    // A player's team pointer renders as a slot label once the team base
    // is known, and as hex when it points nowhere sensible.
    assert!(engine.set(
        TableKind::Player,
        1,
        "Vitals",
        "Current Team",
        &FieldValue::Pointer(TEAM_BASE + 2 * TEAM_STRIDE)
    ));
    let value = engine
        .get(TableKind::Player, 1, "Vitals", "Current Team")
        .unwrap();
    assert_eq!(engine.render_value(&value), "Team #2");
    assert_eq!(
        engine.render_value(&FieldValue::Pointer(0xDEAD)),
        "0x000000000000DEAD"
    );
}

#[test]
fn schema_reload_invalidates_cached_bases() {
    let mut engine = engine();
    assert!(engine.resolve_table_base(TableKind::Player).is_some());
    engine.reload_schema(schema());
    // Base must be re-resolved (and re-validated) after the swap.
    assert_eq!(engine.resolve_table_base(TableKind::Player), Some(PLAYER_BASE));
}
