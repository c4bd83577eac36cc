//! The durable, structured-textual log format (C10).
//!
//! Preserves event ordering and the cosmetic call-nesting indentation the
//! spec requires so that diffs between two runs of the same script stay
//! meaningful to a human reading the log. Field order within a frame is
//! fixed (see [`write_header`]); within an event line, fields are written
//! in each payload variant's declaration order.
//!
//! This is deliberately a hand-rolled line format, not a `serde_json`
//! document: the spec calls for cosmetic indentation tied to call nesting,
//! which a generic serde `Serializer` has no notion of, and the original
//! format is a bespoke text layout the embedder's diagnostic tools already
//! parse line-by-line.

use std::fmt::Write as _;
use std::io::{BufRead, Write};

use ttd_hostapi::{PropertyId, PropertyRecord, ScriptBody, ScriptTables, SnapshotBlob, VarTag};

use crate::error::{EmitError, ParseError};
use crate::events::{
    CallFunctionBeginPayload, CallFunctionEndPayload, CallbackOperationPayload, CodeParsePayload, EventKind,
    EventLogEntry, EventPayload, ExternalCallPayload, SnapshotPayload,
};

/// Target CPU architecture recorded in the log header. Must match exactly on
/// replay (see spec §6 compatibility rules).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86,
    X64,
    Arm64,
    Unknown,
}

impl Arch {
    pub fn current() -> Self {
        match std::env::consts::ARCH {
            "x86" => Self::X86,
            "x86_64" => Self::X64,
            "aarch64" => Self::Arm64,
            _ => Self::Unknown,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::X86 => "x86",
            Self::X64 => "x64",
            Self::Arm64 => "arm64",
            Self::Unknown => "unknown",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "x86" => Self::X86,
            "x64" => Self::X64,
            "arm64" => Self::Arm64,
            "unknown" => Self::Unknown,
            _ => return None,
        })
    }
}

/// The fixed-order frame fields preceding the event sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct LogHeader {
    pub arch: Arch,
    pub diag_enabled: bool,
    pub used_memory: u64,
    pub reserved_memory: u64,
}

/// Writes entries and header metadata to an arbitrary byte sink, tracking
/// the call-nesting indentation level.
pub struct LogWriter<W> {
    out: W,
    indent: usize,
}

impl<W: Write> LogWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, indent: 0 }
    }

    pub fn write_header(&mut self, header: &LogHeader) -> Result<(), EmitError> {
        writeln!(
            self.out,
            "arch={} diagEnabled={} usedMemory={} reservedMemory={}",
            header.arch.as_str(),
            header.diag_enabled,
            header.used_memory,
            header.reserved_memory,
        )?;
        Ok(())
    }

    pub fn write_property_table(&mut self, properties: &[PropertyRecord]) -> Result<(), EmitError> {
        writeln!(self.out, "properties={}", properties.len())?;
        for p in properties {
            writeln!(
                self.out,
                "  pid={} attrs={} name={}",
                p.id.0,
                p.attributes,
                quote_opt(p.name.as_deref())
            )?;
        }
        Ok(())
    }

    pub fn write_script_tables(&mut self, tables: &ScriptTables) -> Result<(), EmitError> {
        self.write_script_table("loadedScripts", &tables.loaded)?;
        self.write_script_table("newFunctionScripts", &tables.new_function)?;
        self.write_script_table("evalScripts", &tables.eval)?;
        Ok(())
    }

    fn write_script_table(&mut self, label: &str, bodies: &[ScriptBody]) -> Result<(), EmitError> {
        writeln!(self.out, "{label}={}", bodies.len())?;
        for b in bodies {
            writeln!(
                self.out,
                "  body={} doc={} uri={} source={}",
                b.body_counter,
                b.document_id,
                quote(&b.source_uri),
                quote(&b.source_code),
            )?;
        }
        Ok(())
    }

    pub fn write_entry(&mut self, entry: &EventLogEntry) -> Result<(), EmitError> {
        if matches!(entry.payload, EventPayload::CallFunctionEnd(_)) {
            self.indent = self.indent.saturating_sub(1);
        }
        let pad = "  ".repeat(self.indent);
        let mut fields = String::new();
        write_fields(&mut fields, &entry.payload);
        writeln!(
            self.out,
            "{pad}{:?} time={}{}",
            entry.payload.kind(),
            entry.event_time,
            fields
        )?;
        if matches!(entry.payload, EventPayload::CallFunctionBegin(_)) {
            self.indent += 1;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), EmitError> {
        self.out.flush()?;
        Ok(())
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

fn quote_opt(s: Option<&str>) -> String {
    match s {
        Some(s) => quote(s),
        None => "-".to_string(),
    }
}

fn unquote(tok: &str) -> String {
    if tok == "-" {
        return String::new();
    }
    let inner = tok.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(tok);
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn write_var(out: &mut String, name: &str, v: VarTag) {
    let _ = write!(out, " {name}=v{}", v.0);
}

fn write_pid(out: &mut String, name: &str, p: PropertyId) {
    if p.is_none() {
        let _ = write!(out, " {name}=none");
    } else {
        let _ = write!(out, " {name}=p{}", p.0);
    }
}

fn write_vars(out: &mut String, name: &str, vs: &[VarTag]) {
    let _ = write!(out, " {name}=[");
    for (i, v) in vs.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "v{}", v.0);
    }
    out.push(']');
}

/// Writes every field of `payload` in variant declaration order, prefixed by
/// a leading space, into `out`. Exhaustive match: the compiler rejects a
/// build that forgets a newly added [`EventPayload`] variant here.
fn write_fields(out: &mut String, payload: &EventPayload) {
    match payload {
        EventPayload::Telemetry { message, print } => {
            let _ = write!(out, " message={} print={print}", quote(message));
        }
        EventPayload::DateTime { value } => {
            let _ = write!(out, " value={value}");
        }
        EventPayload::DateString { value } => {
            let _ = write!(out, " value={}", quote(value));
        }
        EventPayload::RandomSeed { low, high } => {
            let _ = write!(out, " low={low} high={high}");
        }
        EventPayload::PropertyEnum {
            has_property,
            pid,
            attributes,
            name,
        } => {
            let _ = write!(out, " hasProperty={has_property}");
            write_pid(out, "pid", *pid);
            let _ = write!(out, " attrs={attributes} name={}", quote_opt(name.as_deref()));
        }
        EventPayload::SymbolCreation { pid } => write_pid(out, "pid", *pid),
        EventPayload::ExternalCall(ExternalCallPayload {
            root_depth,
            callee,
            args,
            return_value,
            has_script_exception,
            has_terminal_exception,
        }) => {
            let _ = write!(out, " rootDepth={root_depth}");
            write_var(out, "callee", *callee);
            write_vars(out, "args", args);
            write_var(out, "return", *return_value);
            let _ = write!(out, " hasScriptException={has_script_exception} hasTerminalException={has_terminal_exception}");
        }
        EventPayload::ExternalCbRegister { callback_var } => write_var(out, "callbackVar", *callback_var),
        EventPayload::CreateNumber { value, result } => {
            let _ = write!(out, " value={value}");
            write_var(out, "result", *result);
        }
        EventPayload::CreateBoolean { value, result } => {
            let _ = write!(out, " value={value}");
            write_var(out, "result", *result);
        }
        EventPayload::CreateString { bytes, result } => {
            let _ = write!(out, " bytes={}", quote(&String::from_utf8_lossy(bytes)));
            write_var(out, "result", *result);
        }
        EventPayload::CreateSymbol { description, result } => {
            let _ = write!(out, " description={}", quote_opt(description.as_deref()));
            write_var(out, "result", *result);
        }
        EventPayload::VarToObject { input, result } => {
            write_var(out, "input", *input);
            write_var(out, "result", *result);
        }
        EventPayload::AddRootRef { var } => write_var(out, "var", *var),
        EventPayload::RemoveRootRef { var } => write_var(out, "var", *var),
        EventPayload::EventLoopYieldPoint => {}
        EventPayload::AllocateBasicObject { result } => write_var(out, "result", *result),
        EventPayload::AllocateArray { length, result } => {
            let _ = write!(out, " length={length}");
            write_var(out, "result", *result);
        }
        EventPayload::AllocateArrayBuffer { length, result } => {
            let _ = write!(out, " length={length}");
            write_var(out, "result", *result);
        }
        EventPayload::AllocateFunction { name, result } => {
            let _ = write!(out, " name={}", quote_opt(name.as_deref()));
            write_var(out, "result", *result);
        }
        EventPayload::GetAndClearException { had_exception } => {
            let _ = write!(out, " hadException={had_exception}");
        }
        EventPayload::GetProperty { object, pid, result } => {
            write_var(out, "object", *object);
            write_pid(out, "pid", *pid);
            write_var(out, "result", *result);
        }
        EventPayload::GetIndex { object, index, result } => {
            write_var(out, "object", *object);
            let _ = write!(out, " index={index}");
            write_var(out, "result", *result);
        }
        EventPayload::GetOwnPropertyInfo {
            object,
            pid,
            found,
            attributes,
        } => {
            write_var(out, "object", *object);
            write_pid(out, "pid", *pid);
            let _ = write!(out, " found={found} attrs={attributes}");
        }
        EventPayload::GetOwnPropertiesInfo { object, pids } => {
            write_var(out, "object", *object);
            let _ = write!(out, " pids=[");
            for (i, p) in pids.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                let _ = write!(out, "{}", p.0);
            }
            out.push(']');
        }
        EventPayload::DefineProperty { object, pid, attributes } => {
            write_var(out, "object", *object);
            write_pid(out, "pid", *pid);
            let _ = write!(out, " attrs={attributes}");
        }
        EventPayload::DeleteProperty { object, pid, result } => {
            write_var(out, "object", *object);
            write_pid(out, "pid", *pid);
            let _ = write!(out, " result={result}");
        }
        EventPayload::SetPrototype { object, prototype } => {
            write_var(out, "object", *object);
            write_var(out, "prototype", *prototype);
        }
        EventPayload::SetProperty { object, pid, value } => {
            write_var(out, "object", *object);
            write_pid(out, "pid", *pid);
            write_var(out, "value", *value);
        }
        EventPayload::SetIndex { object, index, value } => {
            write_var(out, "object", *object);
            let _ = write!(out, " index={index}");
            write_var(out, "value", *value);
        }
        EventPayload::GetTypedArrayInfo {
            object,
            byte_length,
            byte_offset,
            element_kind,
        } => {
            write_var(out, "object", *object);
            let _ = write!(out, " byteLength={byte_length} byteOffset={byte_offset} elementKind={element_kind}");
        }
        EventPayload::ConstructCall { callee, args, result } => {
            write_var(out, "callee", *callee);
            write_vars(out, "args", args);
            write_var(out, "result", *result);
        }
        EventPayload::CallbackOperation(CallbackOperationPayload {
            create,
            repeating,
            host_callback_id,
            callee,
        }) => {
            let _ = write!(out, " create={create} repeating={repeating} hostCallbackId={host_callback_id}");
            write_var(out, "callee", *callee);
        }
        EventPayload::CodeParse(CodeParsePayload {
            body_counter,
            load_flags,
            document_id,
            source_uri,
            source_code,
            log_dir,
        }) => {
            let _ = write!(
                out,
                " bodyCounter={body_counter} loadFlags={load_flags} documentId={document_id} sourceUri={} sourceCode={} logDir={}",
                quote(source_uri),
                quote(source_code),
                quote(log_dir),
            );
        }
        EventPayload::CallFunctionBegin(CallFunctionBeginPayload {
            root_depth,
            host_callback_id,
            wall_clock_time,
            callee,
            args,
            rtr_snapshot,
        }) => {
            let _ = write!(
                out,
                " rootDepth={root_depth} hostCallbackId={host_callback_id} wallClockTime={wall_clock_time}"
            );
            write_var(out, "callee", *callee);
            write_vars(out, "args", args);
            let _ = write!(out, " rtrSnapshot={}", rtr_snapshot.is_some());
        }
        EventPayload::CallFunctionEnd(CallFunctionEndPayload {
            root_depth,
            host_callback_id,
        }) => {
            let _ = write!(out, " rootDepth={root_depth} hostCallbackId={host_callback_id}");
        }
        EventPayload::CodeLoad { body_counter } => {
            let _ = write!(out, " bodyCounter={body_counter}");
        }
        EventPayload::Snapshot(SnapshotPayload {
            blob,
            restore_event_time,
            restore_log_tag,
        }) => {
            let _ = write!(
                out,
                " blobLen={} restoreEventTime={restore_event_time} restoreLogTag={restore_log_tag}",
                blob.0.len()
            );
        }
    }
}

/// Splits a line into whitespace-separated tokens, treating `"..."`
/// sequences (with `\"`/`\\` escapes) as a single token even if they
/// contain spaces.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();
    let mut cur = String::new();
    let mut in_quotes = false;
    while let Some(c) = chars.next() {
        if in_quotes {
            cur.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    cur.push(escaped);
                }
            } else if c == '"' {
                in_quotes = false;
            }
            continue;
        }
        match c {
            ' ' | '\t' => {
                if !cur.is_empty() {
                    tokens.push(std::mem::take(&mut cur));
                }
            }
            '"' => {
                in_quotes = true;
                cur.push(c);
            }
            _ => cur.push(c),
        }
    }
    if !cur.is_empty() {
        tokens.push(cur);
    }
    tokens
}

fn split_kv(tok: &str) -> Option<(&str, &str)> {
    tok.split_once('=')
}

fn parse_var(v: &str) -> VarTag {
    VarTag(v.strip_prefix('v').unwrap_or(v).parse().unwrap_or(0))
}

fn parse_pid(v: &str) -> PropertyId {
    if v == "none" {
        PropertyId::NONE
    } else {
        PropertyId(v.strip_prefix('p').unwrap_or(v).parse().unwrap_or(0))
    }
}

fn parse_vars(v: &str) -> Vec<VarTag> {
    let inner = v.trim_start_matches('[').trim_end_matches(']');
    if inner.is_empty() {
        return Vec::new();
    }
    inner.split(',').map(parse_var).collect()
}

/// Reads header metadata and the event sequence back from a [`BufRead`].
pub struct LogReader<R> {
    lines: std::io::Lines<R>,
}

impl<R: BufRead> LogReader<R> {
    pub fn new(inner: R) -> Self {
        Self { lines: inner.lines() }
    }

    fn next_line(&mut self, context: &'static str) -> Result<String, ParseError> {
        self.lines
            .next()
            .ok_or(ParseError::UnexpectedEof { context })?
            .map_err(ParseError::Io)
    }

    /// Reads the header frame and checks it against the current build,
    /// per the spec §6 compatibility rules.
    pub fn read_header(&mut self, current_diag_enabled: bool) -> Result<LogHeader, ParseError> {
        let line = self.next_line("header")?;
        let mut arch = None;
        let mut diag_enabled = None;
        let mut used_memory = None;
        let mut reserved_memory = None;
        for tok in tokenize(&line) {
            let Some((k, v)) = split_kv(&tok) else { continue };
            match k {
                "arch" => arch = Arch::parse(v),
                "diagEnabled" => diag_enabled = v.parse().ok(),
                "usedMemory" => used_memory = v.parse().ok(),
                "reservedMemory" => reserved_memory = v.parse().ok(),
                _ => {}
            }
        }
        let arch = arch.ok_or(ParseError::MalformedField {
            field: "arch",
            reason: "missing or unrecognized".into(),
        })?;
        let diag_enabled = diag_enabled.ok_or(ParseError::MalformedField {
            field: "diagEnabled",
            reason: "missing or not a bool".into(),
        })?;
        if arch != Arch::current() {
            log::warn!("log header arch mismatch: recorded {arch:?}, current host {:?}", Arch::current());
            return Err(ParseError::ArchMismatch {
                recorded: format!("{arch:?}"),
                current: format!("{:?}", Arch::current()),
            });
        }
        if diag_enabled != current_diag_enabled {
            log::warn!("log header diagEnabled mismatch: recorded {diag_enabled}, current build {current_diag_enabled}");
            return Err(ParseError::DiagFlagMismatch {
                recorded: diag_enabled,
                current: current_diag_enabled,
            });
        }
        Ok(LogHeader {
            arch,
            diag_enabled,
            used_memory: used_memory.unwrap_or(0),
            reserved_memory: reserved_memory.unwrap_or(0),
        })
    }

    pub fn read_property_table(&mut self) -> Result<Vec<PropertyRecord>, ParseError> {
        let count = self.read_count_line("properties")?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let line = self.next_line("property record")?;
            let toks = tokenize(&line);
            let mut pid = PropertyId::NONE;
            let mut attrs = 0u32;
            let mut name = None;
            for tok in toks {
                if let Some((k, v)) = split_kv(&tok) {
                    match k {
                        "pid" => pid = PropertyId(v.parse().unwrap_or(0)),
                        "attrs" => attrs = v.parse().unwrap_or(0),
                        "name" => {
                            let s = unquote(v);
                            name = (!s.is_empty() || v != "-").then_some(s);
                        }
                        _ => {}
                    }
                }
            }
            out.push(PropertyRecord {
                id: pid,
                name,
                attributes: attrs,
            });
        }
        Ok(out)
    }

    pub fn read_script_tables(&mut self) -> Result<ScriptTables, ParseError> {
        Ok(ScriptTables {
            loaded: self.read_script_table("loadedScripts")?,
            new_function: self.read_script_table("newFunctionScripts")?,
            eval: self.read_script_table("evalScripts")?,
        })
    }

    fn read_script_table(&mut self, label: &'static str) -> Result<Vec<ScriptBody>, ParseError> {
        let count = self.read_count_line(label)?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            let line = self.next_line(label)?;
            let mut body_counter = 0;
            let mut document_id = 0;
            let mut source_uri = String::new();
            let mut source_code = String::new();
            for tok in tokenize(&line) {
                if let Some((k, v)) = split_kv(&tok) {
                    match k {
                        "body" => body_counter = v.parse().unwrap_or(0),
                        "doc" => document_id = v.parse().unwrap_or(0),
                        "uri" => source_uri = unquote(v),
                        "source" => source_code = unquote(v),
                        _ => {}
                    }
                }
            }
            out.push(ScriptBody {
                body_counter,
                document_id,
                source_uri,
                source_code,
            });
        }
        Ok(out)
    }

    fn read_count_line(&mut self, label: &'static str) -> Result<usize, ParseError> {
        let line = self.next_line(label)?;
        let (k, v) = split_kv(line.trim()).ok_or(ParseError::MalformedField {
            field: label,
            reason: "missing count".into(),
        })?;
        if k != label {
            return Err(ParseError::MalformedField {
                field: label,
                reason: format!("expected `{label}=N`, got `{k}`"),
            });
        }
        v.parse().map_err(|_| ParseError::MalformedField {
            field: label,
            reason: "count is not an integer".into(),
        })
    }

    /// Reads the event-count line and then `count` entries in order,
    /// re-deriving indentation purely from call-begin/end kinds (the
    /// indentation itself is cosmetic and not consulted for correctness).
    pub fn read_events(&mut self) -> Result<Vec<EventLogEntry>, ParseError> {
        let count = self.read_count_line("events")?;
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            out.push(self.read_entry()?);
        }
        Ok(out)
    }

    fn read_entry(&mut self) -> Result<EventLogEntry, ParseError> {
        let line = self.next_line("event entry")?;
        let trimmed = line.trim_start();
        let toks = tokenize(trimmed);
        let mut iter = toks.into_iter();
        let kind_str = iter.next().ok_or(ParseError::MalformedField {
            field: "kind",
            reason: "empty entry line".into(),
        })?;
        let mut fields = std::collections::HashMap::new();
        for tok in iter {
            if let Some((k, v)) = split_kv(&tok) {
                fields.insert(k.to_string(), v.to_string());
            }
        }
        let event_time = fields
            .get("time")
            .and_then(|v| v.parse().ok())
            .ok_or(ParseError::MalformedField {
                field: "time",
                reason: "missing or not a u64".into(),
            })?;
        let payload = parse_payload(&kind_str, &fields)?;
        Ok(EventLogEntry { event_time, payload })
    }
}

fn field<'a>(fields: &'a std::collections::HashMap<String, String>, name: &'static str) -> Result<&'a str, ParseError> {
    fields
        .get(name)
        .map(String::as_str)
        .ok_or(ParseError::MalformedField {
            field: name,
            reason: "missing field".into(),
        })
}

fn field_opt<'a>(fields: &'a std::collections::HashMap<String, String>, name: &str) -> Option<&'a str> {
    fields.get(name).map(String::as_str)
}

fn parse_payload(
    kind_str: &str,
    fields: &std::collections::HashMap<String, String>,
) -> Result<EventPayload, ParseError> {
    macro_rules! f {
        ($name:literal) => {
            field(fields, $name)?
        };
    }
    macro_rules! num {
        ($name:literal) => {
            f!($name).parse().map_err(|_| ParseError::MalformedField {
                field: $name,
                reason: "not a number".into(),
            })?
        };
    }

    Ok(match kind_str {
        "Telemetry" => EventPayload::Telemetry {
            message: unquote(f!("message")),
            print: num!("print"),
        },
        "DateTime" => EventPayload::DateTime { value: num!("value") },
        "DateString" => EventPayload::DateString {
            value: unquote(f!("value")),
        },
        "RandomSeed" => EventPayload::RandomSeed {
            low: num!("low"),
            high: num!("high"),
        },
        "PropertyEnum" => EventPayload::PropertyEnum {
            has_property: num!("hasProperty"),
            pid: parse_pid(f!("pid")),
            attributes: num!("attrs"),
            name: field_opt(fields, "name").map(unquote),
        },
        "SymbolCreation" => EventPayload::SymbolCreation { pid: parse_pid(f!("pid")) },
        "ExternalCall" => EventPayload::ExternalCall(ExternalCallPayload {
            root_depth: num!("rootDepth"),
            callee: parse_var(f!("callee")),
            args: parse_vars(f!("args")),
            return_value: parse_var(f!("return")),
            has_script_exception: num!("hasScriptException"),
            has_terminal_exception: num!("hasTerminalException"),
        }),
        "ExternalCbRegister" => EventPayload::ExternalCbRegister {
            callback_var: parse_var(f!("callbackVar")),
        },
        "CreateNumber" => EventPayload::CreateNumber {
            value: num!("value"),
            result: parse_var(f!("result")),
        },
        "CreateBoolean" => EventPayload::CreateBoolean {
            value: num!("value"),
            result: parse_var(f!("result")),
        },
        "CreateString" => EventPayload::CreateString {
            bytes: unquote(f!("bytes")).into_bytes(),
            result: parse_var(f!("result")),
        },
        "CreateSymbol" => EventPayload::CreateSymbol {
            description: field_opt(fields, "description").map(unquote),
            result: parse_var(f!("result")),
        },
        "VarToObject" => EventPayload::VarToObject {
            input: parse_var(f!("input")),
            result: parse_var(f!("result")),
        },
        "AddRootRef" => EventPayload::AddRootRef { var: parse_var(f!("var")) },
        "RemoveRootRef" => EventPayload::RemoveRootRef { var: parse_var(f!("var")) },
        "EventLoopYieldPoint" => EventPayload::EventLoopYieldPoint,
        "AllocateBasicObject" => EventPayload::AllocateBasicObject {
            result: parse_var(f!("result")),
        },
        "AllocateArray" => EventPayload::AllocateArray {
            length: num!("length"),
            result: parse_var(f!("result")),
        },
        "AllocateArrayBuffer" => EventPayload::AllocateArrayBuffer {
            length: num!("length"),
            result: parse_var(f!("result")),
        },
        "AllocateFunction" => EventPayload::AllocateFunction {
            name: field_opt(fields, "name").map(unquote),
            result: parse_var(f!("result")),
        },
        "GetAndClearException" => EventPayload::GetAndClearException {
            had_exception: num!("hadException"),
        },
        "GetProperty" => EventPayload::GetProperty {
            object: parse_var(f!("object")),
            pid: parse_pid(f!("pid")),
            result: parse_var(f!("result")),
        },
        "GetIndex" => EventPayload::GetIndex {
            object: parse_var(f!("object")),
            index: num!("index"),
            result: parse_var(f!("result")),
        },
        "GetOwnPropertyInfo" => EventPayload::GetOwnPropertyInfo {
            object: parse_var(f!("object")),
            pid: parse_pid(f!("pid")),
            found: num!("found"),
            attributes: num!("attrs"),
        },
        "GetOwnPropertiesInfo" => {
            let inner = f!("pids").trim_start_matches('[').trim_end_matches(']').to_string();
            let pids = if inner.is_empty() {
                Vec::new()
            } else {
                inner
                    .split(',')
                    .map(|s| PropertyId(s.parse().unwrap_or(0)))
                    .collect()
            };
            EventPayload::GetOwnPropertiesInfo {
                object: parse_var(f!("object")),
                pids,
            }
        }
        "DefineProperty" => EventPayload::DefineProperty {
            object: parse_var(f!("object")),
            pid: parse_pid(f!("pid")),
            attributes: num!("attrs"),
        },
        "DeleteProperty" => EventPayload::DeleteProperty {
            object: parse_var(f!("object")),
            pid: parse_pid(f!("pid")),
            result: num!("result"),
        },
        "SetPrototype" => EventPayload::SetPrototype {
            object: parse_var(f!("object")),
            prototype: parse_var(f!("prototype")),
        },
        "SetProperty" => EventPayload::SetProperty {
            object: parse_var(f!("object")),
            pid: parse_pid(f!("pid")),
            value: parse_var(f!("value")),
        },
        "SetIndex" => EventPayload::SetIndex {
            object: parse_var(f!("object")),
            index: num!("index"),
            value: parse_var(f!("value")),
        },
        "GetTypedArrayInfo" => EventPayload::GetTypedArrayInfo {
            object: parse_var(f!("object")),
            byte_length: num!("byteLength"),
            byte_offset: num!("byteOffset"),
            element_kind: num!("elementKind"),
        },
        "ConstructCall" => EventPayload::ConstructCall {
            callee: parse_var(f!("callee")),
            args: parse_vars(f!("args")),
            result: parse_var(f!("result")),
        },
        "CallbackOperation" => EventPayload::CallbackOperation(CallbackOperationPayload {
            create: num!("create"),
            repeating: num!("repeating"),
            host_callback_id: num!("hostCallbackId"),
            callee: parse_var(f!("callee")),
        }),
        "CodeParse" => EventPayload::CodeParse(CodeParsePayload {
            body_counter: num!("bodyCounter"),
            load_flags: num!("loadFlags"),
            document_id: num!("documentId"),
            source_uri: unquote(f!("sourceUri")),
            source_code: unquote(f!("sourceCode")),
            log_dir: unquote(f!("logDir")),
        }),
        "CallFunctionBegin" => EventPayload::CallFunctionBegin(CallFunctionBeginPayload {
            root_depth: num!("rootDepth"),
            host_callback_id: num!("hostCallbackId"),
            wall_clock_time: num!("wallClockTime"),
            callee: parse_var(f!("callee")),
            args: parse_vars(f!("args")),
            // The blob itself is not round-tripped through the textual log;
            // RTR snapshots live in a companion file under `log_dir` (spec
            // §6), addressed by this entry's event time.
            rtr_snapshot: (f!("rtrSnapshot") == "true").then(|| SnapshotBlob::default()),
        }),
        "CallFunctionEnd" => EventPayload::CallFunctionEnd(CallFunctionEndPayload {
            root_depth: num!("rootDepth"),
            host_callback_id: num!("hostCallbackId"),
        }),
        "CodeLoad" => EventPayload::CodeLoad {
            body_counter: num!("bodyCounter"),
        },
        "Snapshot" => EventPayload::Snapshot(SnapshotPayload {
            // Same companion-file rule as RTR snapshots above.
            blob: SnapshotBlob::default(),
            restore_event_time: num!("restoreEventTime"),
            restore_log_tag: num!("restoreLogTag"),
        }),
        other => {
            return Err(ParseError::MalformedField {
                field: "kind",
                reason: format!("unrecognized event kind `{other}`"),
            })
        }
    })
}

/// Writes the event-count line followed by every entry in `entries`, in
/// order, through `w`.
pub fn write_events<W: Write>(w: &mut LogWriter<W>, entries: &[EventLogEntry]) -> Result<(), EmitError> {
    writeln!(w.out, "events={}", entries.len())?;
    for e in entries {
        w.write_entry(e)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_entries() -> Vec<EventLogEntry> {
        vec![
            EventLogEntry {
                event_time: 0,
                payload: EventPayload::DateTime { value: 1234.5 },
            },
            EventLogEntry {
                event_time: 1,
                payload: EventPayload::RandomSeed { low: 0xA, high: 0xB },
            },
        ]
    }

    #[test]
    fn header_round_trips() {
        let header = LogHeader {
            arch: Arch::current(),
            diag_enabled: true,
            used_memory: 100,
            reserved_memory: 200,
        };
        let mut buf = Vec::new();
        LogWriter::new(&mut buf).write_header(&header).unwrap();
        let mut reader = LogReader::new(Cursor::new(buf));
        let parsed = reader.read_header(true).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn arch_mismatch_is_hard_error() {
        let mut buf = Vec::new();
        writeln!(buf, "arch=unknown diagEnabled=true usedMemory=0 reservedMemory=0").unwrap();
        if Arch::current() != Arch::Unknown {
            let mut reader = LogReader::new(Cursor::new(buf));
            let err = reader.read_header(true).unwrap_err();
            assert!(matches!(err, ParseError::ArchMismatch { .. }));
        }
    }

    #[test]
    fn events_round_trip_s1_s2() {
        let entries = sample_entries();
        let mut buf = Vec::new();
        {
            let mut w = LogWriter::new(&mut buf);
            write_events(&mut w, &entries).unwrap();
        }
        let mut reader = LogReader::new(Cursor::new(buf));
        let parsed = reader.read_events().unwrap();
        assert_eq!(parsed, entries);
    }

    #[test]
    fn call_nesting_indentation_is_cosmetic_only() {
        let entries = vec![
            EventLogEntry {
                event_time: 0,
                payload: EventPayload::CallFunctionBegin(CallFunctionBeginPayload {
                    root_depth: 0,
                    host_callback_id: 1,
                    wall_clock_time: 0.0,
                    callee: VarTag(1),
                    args: vec![],
                    rtr_snapshot: None,
                }),
            },
            EventLogEntry {
                event_time: 1,
                payload: EventPayload::DateTime { value: 1.0 },
            },
            EventLogEntry {
                event_time: 2,
                payload: EventPayload::CallFunctionEnd(CallFunctionEndPayload {
                    root_depth: 0,
                    host_callback_id: 1,
                }),
            },
        ];
        let mut buf = Vec::new();
        {
            let mut w = LogWriter::new(&mut buf);
            write_events(&mut w, &entries).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().skip(1).collect();
        assert!(lines[1].starts_with("  DateTime"));
        assert!(lines[2].starts_with("CallFunctionEnd"));

        let mut reader = LogReader::new(Cursor::new(text.into_bytes()));
        let parsed = reader.read_events().unwrap();
        assert_eq!(parsed, entries);
    }
}
