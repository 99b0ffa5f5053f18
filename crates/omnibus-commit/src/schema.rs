//! SQL schemas for the canonical bundle and the derived app view.
//!
//! The canonical DDL is hashed into build metadata, so any edit here shows
//! up as a schema change to downstream consumers.

/// Stored as `PRAGMA user_version` in every artifact.
pub const SCHEMA_VERSION: i64 = 1;

/// Canonical bundle DDL. Referential constraints are declared here but only
/// enforced after bulk load (`PRAGMA foreign_keys` is off during import).
pub const CANONICAL_DDL: &str = "
CREATE TABLE operators (
    operator_id   INTEGER PRIMARY KEY,
    operator_code TEXT NOT NULL UNIQUE,
    operator_name TEXT
);

CREATE TABLE places (
    place_id        INTEGER PRIMARY KEY,
    place_key       TEXT NOT NULL UNIQUE,
    name            TEXT,
    lat             REAL,
    lon             REAL,
    parent_place_id INTEGER REFERENCES places(place_id)
);

CREATE TABLE routes (
    route_id             INTEGER PRIMARY KEY,
    route_key            TEXT NOT NULL UNIQUE,
    operator_id          INTEGER NOT NULL REFERENCES operators(operator_id),
    mode                 TEXT,
    route_short_name     TEXT,
    origin_text          TEXT,
    destination_text     TEXT,
    journey_time_minutes INTEGER
);

CREATE TABLE route_patterns (
    pattern_id   INTEGER PRIMARY KEY,
    pattern_key  TEXT UNIQUE,
    route_id     INTEGER NOT NULL REFERENCES routes(route_id),
    route_seq    INTEGER,
    direction_id INTEGER,
    is_circular  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE pattern_stops (
    pattern_id INTEGER NOT NULL REFERENCES route_patterns(pattern_id),
    seq        INTEGER NOT NULL,
    place_id   INTEGER NOT NULL REFERENCES places(place_id),
    PRIMARY KEY (pattern_id, seq)
);

CREATE TABLE fare_products (
    fare_product_id INTEGER PRIMARY KEY,
    mode            TEXT,
    product_name    TEXT
);

CREATE TABLE fare_rules (
    fare_rule_id    INTEGER PRIMARY KEY,
    rule_key        TEXT UNIQUE,
    route_id        INTEGER REFERENCES routes(route_id),
    pattern_id      INTEGER REFERENCES route_patterns(pattern_id),
    origin_seq      INTEGER,
    destination_seq INTEGER
);

CREATE TABLE fare_amounts (
    fare_rule_id    INTEGER NOT NULL REFERENCES fare_rules(fare_rule_id),
    fare_product_id INTEGER NOT NULL REFERENCES fare_products(fare_product_id),
    amount_cents    INTEGER NOT NULL,
    is_default      INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (fare_rule_id, fare_product_id)
);

CREATE TABLE service_calendars (
    service_id TEXT PRIMARY KEY,
    weekdays   TEXT,
    start_date TEXT,
    end_date   TEXT
);

CREATE TABLE headway_trips (
    trip_id           TEXT PRIMARY KEY,
    upstream_route_id INTEGER NOT NULL,
    route_seq         INTEGER,
    service_id        TEXT NOT NULL REFERENCES service_calendars(service_id)
);

CREATE TABLE headway_frequencies (
    upstream_route_id INTEGER NOT NULL,
    route_seq         INTEGER,
    service_id        TEXT NOT NULL REFERENCES service_calendars(service_id),
    start_time        TEXT NOT NULL,
    end_time          TEXT NOT NULL,
    headway_secs      INTEGER NOT NULL,
    sample_trip_id    TEXT
);

-- Derived; fully rebuilt by the headway resolver on every build.
CREATE TABLE pattern_headways (
    pattern_id     INTEGER NOT NULL REFERENCES route_patterns(pattern_id),
    service_id     TEXT NOT NULL REFERENCES service_calendars(service_id),
    start_time     TEXT NOT NULL,
    end_time       TEXT NOT NULL,
    headway_secs   INTEGER NOT NULL,
    sample_trip_id TEXT,
    PRIMARY KEY (pattern_id, service_id, start_time, end_time)
);

CREATE TABLE meta (
    meta_id              INTEGER PRIMARY KEY CHECK (meta_id = 1),
    schema_version       INTEGER NOT NULL,
    bundle_version       TEXT NOT NULL,
    generated_at         TEXT NOT NULL,
    source_versions_json TEXT,
    notes                TEXT
);

CREATE INDEX idx_pattern_stops_place   ON pattern_stops(place_id);
CREATE INDEX idx_route_patterns_route  ON route_patterns(route_id, route_seq);
CREATE INDEX idx_fare_rules_route      ON fare_rules(route_id, origin_seq, destination_seq);
CREATE INDEX idx_headway_freq_route    ON headway_frequencies(upstream_route_id, route_seq);
";

/// App-view DDL: the canonical tables the client reads directly, with
/// `fare_segments` in place of the raw fare tables — those must never ship
/// alongside it.
pub const APP_DDL: &str = "
CREATE TABLE operators (
    operator_id   INTEGER PRIMARY KEY,
    operator_code TEXT NOT NULL,
    operator_name TEXT
);

CREATE TABLE places (
    place_id        INTEGER PRIMARY KEY,
    place_key       TEXT NOT NULL,
    name            TEXT,
    lat             REAL,
    lon             REAL,
    parent_place_id INTEGER
);

CREATE TABLE routes (
    route_id             INTEGER PRIMARY KEY,
    route_key            TEXT NOT NULL,
    operator_id          INTEGER NOT NULL REFERENCES operators(operator_id),
    mode                 TEXT,
    route_short_name     TEXT,
    origin_text          TEXT,
    destination_text     TEXT,
    journey_time_minutes INTEGER
);

CREATE TABLE route_patterns (
    pattern_id   INTEGER PRIMARY KEY,
    route_id     INTEGER NOT NULL REFERENCES routes(route_id),
    route_seq    INTEGER,
    direction_id INTEGER,
    is_circular  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE pattern_stops (
    pattern_id INTEGER NOT NULL REFERENCES route_patterns(pattern_id),
    seq        INTEGER NOT NULL,
    place_id   INTEGER NOT NULL REFERENCES places(place_id),
    PRIMARY KEY (pattern_id, seq)
);

CREATE TABLE fare_products (
    fare_product_id INTEGER PRIMARY KEY,
    mode            TEXT,
    product_name    TEXT
);

CREATE TABLE fare_segments (
    route_id        INTEGER NOT NULL REFERENCES routes(route_id),
    fare_product_id INTEGER NOT NULL REFERENCES fare_products(fare_product_id),
    origin_seq      INTEGER NOT NULL,
    dest_from_seq   INTEGER NOT NULL,
    dest_to_seq     INTEGER NOT NULL,
    amount_cents    INTEGER NOT NULL,
    is_default      INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (route_id, fare_product_id, origin_seq, dest_from_seq)
);

CREATE TABLE pattern_headways (
    pattern_id     INTEGER NOT NULL REFERENCES route_patterns(pattern_id),
    service_id     TEXT NOT NULL,
    start_time     TEXT NOT NULL,
    end_time       TEXT NOT NULL,
    headway_secs   INTEGER NOT NULL,
    sample_trip_id TEXT,
    PRIMARY KEY (pattern_id, service_id, start_time, end_time)
);

CREATE TABLE meta (
    meta_id        INTEGER PRIMARY KEY CHECK (meta_id = 1),
    schema_version INTEGER NOT NULL,
    bundle_version TEXT NOT NULL,
    generated_at   TEXT NOT NULL,
    notes          TEXT
);

CREATE INDEX idx_app_pattern_stops_place  ON pattern_stops(place_id);
CREATE INDEX idx_app_route_patterns_route ON route_patterns(route_id, route_seq);
";
