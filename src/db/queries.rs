// sos_alerts

pub const INSERT_ALERT: &str = r#"
INSERT INTO sos_alerts (id, status, sender_info, lat, lng, vehicle_data, trigger_method)
VALUES ($1, 'active', $2, $3, $4, $5, $6)
ON CONFLICT (id) DO NOTHING;
"#;

pub const UPSERT_ALERT_SENDER: &str = r#"
INSERT INTO users (user_id, username, reg_number)
VALUES ($1, $2, $3)
ON CONFLICT (user_id) DO UPDATE
SET username = EXCLUDED.username,
    reg_number = COALESCE(EXCLUDED.reg_number, users.reg_number);
"#;

pub const SELECT_ALERT: &str = r#"
SELECT id, status, sender_info, lat, lng, vehicle_data, trigger_method, dispatched_ambulance_id, created_at
FROM sos_alerts WHERE id = $1;
"#;

pub const SELECT_ACTIVE_ALERTS: &str = r#"
SELECT id, status, sender_info, lat, lng, vehicle_data, trigger_method, dispatched_ambulance_id, created_at
FROM sos_alerts WHERE status = 'active'
ORDER BY created_at ASC, id ASC;
"#;

pub const SELECT_ALERT_FOR_UPDATE: &str = r#"
SELECT id, status, sender_info, lat, lng, vehicle_data, trigger_method, dispatched_ambulance_id, created_at
FROM sos_alerts WHERE id = $1 FOR UPDATE;
"#;

pub const UPDATE_ALERT_DISPATCHED: &str = r#"
UPDATE sos_alerts
SET status = 'dispatched',
    dispatched_ambulance_id = $2
WHERE id = $1 AND status = 'active'
RETURNING id, status, sender_info, lat, lng, vehicle_data, trigger_method, dispatched_ambulance_id, created_at;
"#;

pub const UPDATE_ALERT_RESOLVED: &str = r#"
UPDATE sos_alerts
SET status = 'resolved'
WHERE id = $1 AND status <> 'resolved'
RETURNING id, status, sender_info, lat, lng, vehicle_data, trigger_method, dispatched_ambulance_id, created_at;
"#;

// messages

pub const INSERT_MESSAGE: &str = r#"
INSERT INTO messages (id, kind, message, ai_analysis, sender_info, lat, lng)
VALUES ($1, $2, $3, $4, $5, $6, $7)
RETURNING id, kind, message, ai_analysis, sender_info, lat, lng, created_at;
"#;

pub const SELECT_RECENT_MESSAGES: &str = r#"
SELECT id, kind, message, ai_analysis, sender_info, lat, lng, created_at
FROM messages
ORDER BY created_at DESC
LIMIT $1;
"#;

// users

pub const UPSERT_USER_LOCATION: &str = r#"
INSERT INTO users (user_id, lat, lng, location_updated_at)
VALUES ($1, $2, $3, NOW())
ON CONFLICT (user_id) DO UPDATE
SET lat = EXCLUDED.lat,
    lng = EXCLUDED.lng,
    location_updated_at = NOW();
"#;

// ambulances

pub const SELECT_AMBULANCES: &str = r#"
SELECT id, lat, lng, status, dest_lat, dest_lng, speed_kmh, unit_type
FROM ambulances ORDER BY id;
"#;

pub const SELECT_AMBULANCE: &str = r#"
SELECT id, lat, lng, status, dest_lat, dest_lng, speed_kmh, unit_type
FROM ambulances WHERE id = $1;
"#;

pub const SELECT_AMBULANCE_FOR_UPDATE: &str = r#"
SELECT id, lat, lng, status, dest_lat, dest_lng, speed_kmh, unit_type
FROM ambulances WHERE id = $1 FOR UPDATE;
"#;

pub const UPSERT_AMBULANCE: &str = r#"
INSERT INTO ambulances (id, lat, lng, status, dest_lat, dest_lng, speed_kmh, unit_type, updated_at)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
ON CONFLICT (id) DO UPDATE
SET lat = EXCLUDED.lat,
    lng = EXCLUDED.lng,
    -- A unit on a dispatch keeps it until released.
    status = CASE WHEN ambulances.status = 'en-route' THEN ambulances.status ELSE EXCLUDED.status END,
    dest_lat = CASE WHEN ambulances.status = 'en-route' THEN ambulances.dest_lat ELSE EXCLUDED.dest_lat END,
    dest_lng = CASE WHEN ambulances.status = 'en-route' THEN ambulances.dest_lng ELSE EXCLUDED.dest_lng END,
    speed_kmh = EXCLUDED.speed_kmh,
    unit_type = EXCLUDED.unit_type,
    updated_at = NOW();
"#;

pub const UPDATE_AMBULANCE_POSITION: &str = r#"
UPDATE ambulances
SET lat = $2,
    lng = $3,
    speed_kmh = COALESCE($4, speed_kmh),
    updated_at = NOW()
WHERE id = $1;
"#;

pub const UPDATE_AMBULANCE_EN_ROUTE: &str = r#"
UPDATE ambulances
SET status = 'en-route',
    dest_lat = $2,
    dest_lng = $3,
    updated_at = NOW()
WHERE id = $1 AND status = 'available'
RETURNING id, lat, lng, status, dest_lat, dest_lng, speed_kmh, unit_type;
"#;

pub const UPDATE_AMBULANCE_AVAILABLE: &str = r#"
UPDATE ambulances
SET status = 'available',
    dest_lat = NULL,
    dest_lng = NULL,
    updated_at = NOW()
WHERE id = $1 AND (status <> 'available' OR dest_lat IS NOT NULL)
RETURNING id, lat, lng, status, dest_lat, dest_lng, speed_kmh, unit_type;
"#;

// traffic_signals

pub const SELECT_SIGNALS: &str = r#"
SELECT id, name, location_label, lat, lng, state FROM traffic_signals ORDER BY id;
"#;

pub const UPSERT_SIGNAL: &str = r#"
INSERT INTO traffic_signals (id, name, location_label, lat, lng, state)
VALUES ($1, $2, $3, $4, $5, $6)
ON CONFLICT (id) DO UPDATE
SET name = EXCLUDED.name,
    location_label = EXCLUDED.location_label,
    lat = EXCLUDED.lat,
    lng = EXCLUDED.lng,
    state = EXCLUDED.state;
"#;

pub const UPDATE_SIGNAL_STATE: &str = r#"
UPDATE traffic_signals SET state = $2 WHERE id = $1;
"#;

// realtime_values

pub const SELECT_VALUE: &str = r#"
SELECT value FROM realtime_values WHERE path = $1;
"#;

pub const UPSERT_VALUE: &str = r#"
INSERT INTO realtime_values (path, value, updated_at)
VALUES ($1, $2, NOW())
ON CONFLICT (path) DO UPDATE
SET value = EXCLUDED.value,
    updated_at = NOW();
"#;
