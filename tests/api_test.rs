//! JSON requests through the handler, as the binary sees them

use memory_scan_core::core::types::{Address, MemoryRegion, MemoryValue, Protection};
use memory_scan_core::memory::SnapshotMemory;
use memory_scan_core::pointer::{PointerResolver, PointerSettings};
use memory_scan_core::scan::{ScanSettings, SessionStore, StoreLimits, WorkerPool};
use memory_scan_core::Handler;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

const MODULE: usize = 0x400000;
const HEAP: usize = 0x1000000;

fn handler() -> (Handler, Arc<SnapshotMemory>) {
    let mut mem = SnapshotMemory::new();
    let mut code = vec![0x90u8; 0x1000];
    code[0x20..0x24].copy_from_slice(&[0x48, 0x8B, 0x05, 0x11]);
    mem.add_region(
        MemoryRegion::new(Address::new(MODULE), 0x1000, Protection::read_execute())
            .with_module("game.exe"),
        code,
    );
    mem.add_region(
        MemoryRegion::new(Address::new(MODULE + 0x1000), 0x1000, Protection::read_write())
            .with_module("game.exe"),
        vec![0; 0x1000],
    );
    mem.add_region(
        MemoryRegion::new(Address::new(HEAP), 0x2000, Protection::read_write()),
        vec![0; 0x2000],
    );
    let mem = Arc::new(mem);

    let pool = Arc::new(WorkerPool::new(2).unwrap());
    let store = Arc::new(SessionStore::new(
        mem.clone(),
        Arc::clone(&pool),
        ScanSettings::default(),
        StoreLimits::default(),
    ));
    let pointers = Arc::new(PointerResolver::new(
        mem.clone(),
        pool,
        PointerSettings {
            pointer_width: 8,
            ..PointerSettings::default()
        },
    ));
    (Handler::new(store, pointers), mem)
}

fn call(handler: &Handler, request: Value) -> Value {
    let reply = handler.handle_json(&request.to_string());
    serde_json::from_str(&reply).unwrap()
}

#[test]
fn test_scan_refine_list_close() {
    let (handler, mem) = handler();
    mem.poke(Address::new(HEAP + 0x10), &MemoryValue::I32(500)).unwrap();
    mem.poke(Address::new(HEAP + 0x90), &MemoryValue::I32(500)).unwrap();

    let started = call(
        &handler,
        json!({"method": "startScan", "params": {
            "valueType": "i32",
            "scanType": "exact",
            "criterion": {"kind": "value", "value": {"type": "i32", "value": 500}}
        }}),
    );
    assert_eq!(started["ok"], json!(true));
    assert_eq!(started["data"]["result"], json!("scanStarted"));
    assert_eq!(started["data"]["round"]["matches"], json!(2));
    let session_id = started["data"]["sessionId"].clone();

    mem.poke(Address::new(HEAP + 0x90), &MemoryValue::I32(480)).unwrap();
    let refined = call(
        &handler,
        json!({"method": "refineScan", "params": {
            "sessionId": session_id,
            "scanType": "decreased"
        }}),
    );
    assert_eq!(refined["data"]["round"]["matches"], json!(1));

    let listed = call(
        &handler,
        json!({"method": "listCandidates", "params": {"sessionId": session_id}}),
    );
    assert_eq!(listed["data"]["total"], json!(1));
    assert_eq!(listed["data"]["candidates"][0]["address"], json!("0x0000000001000090"));

    let history = call(
        &handler,
        json!({"method": "sessionHistory", "params": {"sessionId": session_id}}),
    );
    assert_eq!(history["data"]["rounds"].as_array().unwrap().len(), 2);

    let closed = call(
        &handler,
        json!({"method": "closeSession", "params": {"sessionId": session_id}}),
    );
    assert_eq!(closed["data"]["existed"], json!(true));

    let after = call(
        &handler,
        json!({"method": "listCandidates", "params": {"sessionId": session_id}}),
    );
    assert_eq!(after["ok"], json!(false));
    assert_eq!(after["error"]["code"], json!("SessionNotFound"));
}

#[test]
fn test_aob_scan_scoped_to_module() {
    let (handler, _) = handler();
    let reply = call(
        &handler,
        json!({"method": "aobScan", "params": {"pattern": "48 8B ?? 11", "module": "game.exe"}}),
    );
    assert_eq!(reply["ok"], json!(true));
    let matches = reply["data"]["matches"].as_array().unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0]["address"], json!(MODULE + 0x20));
}

#[test]
fn test_pointer_write_and_resolve() {
    let (handler, mem) = handler();
    let write = json!({"method": "writePointer", "params": {
        "chain": "game.exe+0x1100 -> 0x8",
        "value": {"type": "u16", "value": 999}
    }});

    // The slot still holds null
    let failed = call(&handler, write.clone());
    assert_eq!(failed["ok"], json!(false));
    assert_eq!(failed["error"]["code"], json!("WriteFailed"));

    mem.poke_pointer(Address::new(MODULE + 0x1108), Address::new(HEAP + 0x1000), 8).unwrap();
    let written = call(&handler, write);
    assert_eq!(written["ok"], json!(true));
    assert_eq!(written["data"]["address"], json!("0x0000000001001000"));

    let resolved = call(
        &handler,
        json!({"method": "resolvePointer", "params": {
            "chain": {
                "base": {"kind": "module", "name": "game.exe", "offset": 0x1100},
                "offsets": [8]
            },
            "read": {"valueType": "u16"}
        }}),
    );
    assert_eq!(resolved["data"]["value"], json!({"type": "u16", "value": 999}));
    assert_eq!(resolved["data"]["trace"].as_array().unwrap().len(), 2);
}

#[test]
fn test_malformed_request() {
    let (handler, _) = handler();
    let raw = handler.handle_json("{\"method\": \"nope\"}");
    let reply: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(reply["ok"], json!(false));
    assert_eq!(reply["error"]["code"], json!("InvalidRequest"));
}

#[test]
fn test_cancel_idle_session() {
    let (handler, mem) = handler();
    mem.poke(Address::new(HEAP), &MemoryValue::U8(1)).unwrap();
    let started = call(
        &handler,
        json!({"method": "startScan", "params": {
            "valueType": "u8",
            "scanType": "exact",
            "criterion": {"kind": "value", "value": {"type": "u8", "value": 1}}
        }}),
    );
    let session_id = started["data"]["sessionId"].clone();

    let cancelled = call(
        &handler,
        json!({"method": "cancelScan", "params": {"sessionId": session_id}}),
    );
    assert_eq!(cancelled["data"]["wasRunning"], json!(false));
}
