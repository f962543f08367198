//! Provider payload normalization
//!
//! One function per provider payload, each producing the strict internal
//! types from `types`. Payloads are read as loose `serde_json::Value`s: a
//! missing optional field becomes an empty string, and an entry without a
//! usable coordinate is dropped. Nothing here panics on schema drift.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use tracing::debug;

use super::types::{
    AddressFields, CandidateKind, Congestion, GeoCandidate, Incident, IncidentCategory, PoiFields,
    Roadwork, RoutePath, TrafficConditions,
};
use crate::geo::{LatLon, ManeuverKind, ManeuverStep};

/// Nominatim classes that describe places rather than points of interest
const NON_POI_CLASSES: &[&str] = &["place", "highway", "boundary", "building", "landuse", "railway"];

/// Reads a number that may also be sent as a string
fn num(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

/// Reads a string field, defaulting to empty
fn text(v: &Value) -> String {
    match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// First non-empty string among `keys`
fn first_text(obj: &Value, keys: &[&str]) -> String {
    keys.iter()
        .map(|k| text(&obj[*k]))
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

fn strings(v: &Value) -> Vec<String> {
    v.as_array()
        .map(|items| items.iter().map(text).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

/// Position from a `{lat, lon}`-style object with the given field names
fn position(obj: &Value, lat_key: &str, lon_key: &str) -> Option<LatLon> {
    LatLon::new(num(&obj[lat_key])?, num(&obj[lon_key])?).ok()
}

/// First `[lon, lat]` pair found in a (possibly nested) GeoJSON coordinate array
fn first_coordinate(v: &Value) -> Option<LatLon> {
    let items = v.as_array()?;
    match (items.first().and_then(num), items.get(1).and_then(num)) {
        (Some(lon), Some(lat)) => LatLon::from_lon_lat([lon, lat]),
        _ => first_coordinate(items.first()?),
    }
}

/// RFC 3339 timestamp or bare `YYYY-MM-DD` date
fn timestamp(v: &Value) -> Option<DateTime<Utc>> {
    let s = v.as_str()?.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn tomtom_address(addr: &Value) -> AddressFields {
    AddressFields {
        line: text(&addr["freeformAddress"]),
        street: text(&addr["streetName"]),
        house_number: text(&addr["streetNumber"]),
        city: first_text(addr, &["municipality", "municipalitySubdivision"]),
        postal_code: text(&addr["postalCode"]),
        country_code: text(&addr["countryCode"]),
    }
}

/// Normalizes a TomTom Search (fuzzy or typeahead) response
pub fn tomtom_geocode(payload: &Value) -> Vec<GeoCandidate> {
    let Some(results) = payload["results"].as_array() else {
        return Vec::new();
    };

    let max_score = results
        .iter()
        .filter_map(|r| num(&r["score"]))
        .fold(0.0_f64, f64::max);

    results
        .iter()
        .enumerate()
        .filter_map(|(i, r)| {
            let Some(position) = position(&r["position"], "lat", "lon") else {
                debug!(index = i, "Dropping TomTom result without a valid position");
                return None;
            };

            let address = tomtom_address(&r["address"]);

            let poi = (text(&r["type"]) == "POI" || r["poi"].is_object()).then(|| PoiFields {
                name: text(&r["poi"]["name"]),
                phone: text(&r["poi"]["phone"]),
                website: text(&r["poi"]["url"]),
                categories: strings(&r["poi"]["categories"]),
            });

            let relevance_score = match num(&r["score"]) {
                Some(score) if max_score > 0.0 => (score / max_score).clamp(0.0, 1.0),
                _ => 0.0,
            };

            Some(GeoCandidate {
                position,
                address,
                kind: if poi.is_some() { CandidateKind::Poi } else { CandidateKind::Address },
                poi,
                relevance_score,
                provider: "tomtom".to_string(),
                provider_rank: Some(i as u32),
            })
        })
        .collect()
}

/// Normalizes a TomTom reverse geocode response
///
/// Positions arrive as a `"lat,lon"` string.
pub fn tomtom_reverse(payload: &Value) -> Vec<GeoCandidate> {
    let Some(addresses) = payload["addresses"].as_array() else {
        return Vec::new();
    };

    addresses
        .iter()
        .enumerate()
        .filter_map(|(i, r)| {
            let raw = text(&r["position"]);
            let (lat, lon) = raw.split_once(',')?;
            let position = LatLon::new(lat.trim().parse().ok()?, lon.trim().parse().ok()?).ok()?;
            Some(GeoCandidate {
                position,
                address: tomtom_address(&r["address"]),
                poi: None,
                kind: CandidateKind::Address,
                relevance_score: 1.0,
                provider: "tomtom".to_string(),
                provider_rank: Some(i as u32),
            })
        })
        .collect()
}

/// Normalizes a Nominatim search (array) or reverse (single object) response
pub fn nominatim_geocode(payload: &Value) -> Vec<GeoCandidate> {
    let items: Vec<&Value> = match payload {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) if payload.get("error").is_none() => vec![payload],
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|r| {
            let Some(position) = position(r, "lat", "lon") else {
                debug!("Dropping Nominatim result without a valid position");
                return None;
            };

            let addr = &r["address"];
            let address = AddressFields {
                line: text(&r["display_name"]),
                street: first_text(addr, &["road", "pedestrian", "footway"]),
                house_number: text(&addr["house_number"]),
                city: first_text(addr, &["city", "town", "village", "municipality"]),
                postal_code: text(&addr["postcode"]),
                country_code: text(&addr["country_code"]).to_uppercase(),
            };

            let class = first_text(r, &["category", "class"]);
            let name = text(&r["name"]);
            let is_poi = !name.is_empty() && !class.is_empty() && !NON_POI_CLASSES.contains(&class.as_str());
            let poi = is_poi.then(|| {
                let mut categories = vec![class.clone()];
                let kind = text(&r["type"]);
                if !kind.is_empty() && kind != class {
                    categories.push(kind);
                }
                PoiFields {
                    name: name.clone(),
                    phone: first_text(&r["extratags"], &["phone", "contact:phone"]),
                    website: first_text(&r["extratags"], &["website", "contact:website"]),
                    categories,
                }
            });

            Some(GeoCandidate {
                position,
                address,
                kind: if is_poi { CandidateKind::Poi } else { CandidateKind::Address },
                poi,
                relevance_score: num(&r["importance"]).unwrap_or(0.0).clamp(0.0, 1.0),
                provider: "nominatim".to_string(),
                provider_rank: None,
            })
        })
        .collect()
}

/// Maps a TomTom guidance maneuver code
fn tomtom_maneuver(code: &str) -> ManeuverKind {
    match code {
        "DEPART" => ManeuverKind::Depart,
        "ARRIVE" | "ARRIVE_LEFT" | "ARRIVE_RIGHT" => ManeuverKind::Arrive,
        "STRAIGHT" | "FOLLOW" => ManeuverKind::Continue,
        c if c.starts_with("ROUNDABOUT") => ManeuverKind::Roundabout,
        c if c.starts_with("KEEP") => ManeuverKind::Fork,
        c if c.starts_with("MERGE") || c.starts_with("SWITCH_") => ManeuverKind::Merge,
        c if c.contains("EXIT") || c.starts_with("ENTER_") => ManeuverKind::Ramp,
        c if c.starts_with("TURN") || c.starts_with("SHARP") || c.starts_with("BEAR") || c == "MAKE_UTURN" => {
            ManeuverKind::Turn
        }
        _ => ManeuverKind::Other,
    }
}

/// Normalizes a TomTom Routing `calculateRoute` response
pub fn tomtom_route(payload: &Value) -> Vec<RoutePath> {
    let Some(routes) = payload["routes"].as_array() else {
        return Vec::new();
    };

    routes
        .iter()
        .filter_map(|route| {
            let mut points: Vec<LatLon> = Vec::new();
            for leg in route["legs"].as_array().into_iter().flatten() {
                for p in leg["points"].as_array().into_iter().flatten() {
                    if let Some(p) = position(p, "latitude", "longitude") {
                        // consecutive legs share their joint
                        if points.last() != Some(&p) {
                            points.push(p);
                        }
                    }
                }
            }
            if points.len() < 2 {
                debug!("Dropping TomTom route with fewer than two points");
                return None;
            }

            let steps = route["guidance"]["instructions"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|ins| {
                    let at = position(&ins["point"], "latitude", "longitude")?;
                    Some(ManeuverStep {
                        location: [at.lon, at.lat],
                        kind: tomtom_maneuver(&text(&ins["maneuver"])),
                        instruction: text(&ins["message"]),
                    })
                })
                .collect();

            let summary = &route["summary"];
            Some(RoutePath {
                points,
                steps,
                distance_m: num(&summary["lengthInMeters"]),
                duration_s: num(&summary["travelTimeInSeconds"]),
            })
        })
        .collect()
}

/// Maps an OSRM maneuver type
fn osrm_maneuver(kind: &str) -> ManeuverKind {
    match kind {
        "depart" => ManeuverKind::Depart,
        "arrive" => ManeuverKind::Arrive,
        "turn" | "end of road" => ManeuverKind::Turn,
        "on ramp" | "off ramp" => ManeuverKind::Ramp,
        "merge" => ManeuverKind::Merge,
        "fork" => ManeuverKind::Fork,
        "continue" | "new name" => ManeuverKind::Continue,
        k if k.contains("roundabout") || k.contains("rotary") => ManeuverKind::Roundabout,
        _ => ManeuverKind::Other,
    }
}

/// Builds a readable instruction from OSRM step fields
fn osrm_instruction(kind: &str, modifier: &str, road: &str) -> String {
    let mut out = match (kind, modifier) {
        (k, "") => k.to_string(),
        ("turn" | "end of road", m) => format!("turn {}", m),
        (k, m) => format!("{} {}", k, m),
    };
    if !road.is_empty() {
        out.push_str(" onto ");
        out.push_str(road);
    }
    out
}

/// Normalizes an OSRM `route` response requested with GeoJSON geometry and steps
pub fn osrm_route(payload: &Value) -> Vec<RoutePath> {
    let Some(routes) = payload["routes"].as_array() else {
        return Vec::new();
    };

    routes
        .iter()
        .filter_map(|route| {
            let points: Vec<LatLon> = route["geometry"]["coordinates"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|pair| {
                    let pair = pair.as_array()?;
                    LatLon::from_lon_lat([num(pair.first()?)?, num(pair.get(1)?)?])
                })
                .collect();
            if points.len() < 2 {
                debug!("Dropping OSRM route with fewer than two points");
                return None;
            }

            let steps = route["legs"]
                .as_array()
                .into_iter()
                .flatten()
                .flat_map(|leg| leg["steps"].as_array().into_iter().flatten())
                .filter_map(|step| {
                    let maneuver = &step["maneuver"];
                    let at = first_coordinate(&maneuver["location"])?;
                    let kind = text(&maneuver["type"]);
                    Some(ManeuverStep {
                        location: [at.lon, at.lat],
                        kind: osrm_maneuver(&kind),
                        instruction: osrm_instruction(&kind, &text(&maneuver["modifier"]), &text(&step["name"])),
                    })
                })
                .collect();

            Some(RoutePath {
                points,
                steps,
                distance_m: num(&route["distance"]),
                duration_s: num(&route["duration"]),
            })
        })
        .collect()
}

/// Maps a TomTom incident icon category
fn incident_category(icon: Option<f64>) -> IncidentCategory {
    match icon.map(|c| c as i64) {
        Some(1) => IncidentCategory::Accident,
        Some(2) | Some(4) | Some(5) | Some(10) => IncidentCategory::Weather,
        Some(3) | Some(11) | Some(14) => IncidentCategory::Hazard,
        Some(6) => IncidentCategory::Jam,
        Some(7) => IncidentCategory::LaneClosed,
        Some(8) => IncidentCategory::RoadClosed,
        Some(9) => IncidentCategory::Roadworks,
        _ => IncidentCategory::Unknown,
    }
}

/// Normalizes a TomTom Traffic incident details response
pub fn tomtom_incidents(payload: &Value) -> Vec<Incident> {
    let Some(incidents) = payload["incidents"].as_array() else {
        return Vec::new();
    };

    incidents
        .iter()
        .enumerate()
        .filter_map(|(i, inc)| {
            let Some(position) = first_coordinate(&inc["geometry"]["coordinates"]) else {
                debug!(index = i, "Dropping incident without a valid geometry");
                return None;
            };
            let props = &inc["properties"];

            let id = [&props["id"], &inc["id"]]
                .iter()
                .map(|v| text(v))
                .find(|s| !s.is_empty())
                .unwrap_or_else(|| format!("incident-{}", i));

            let description = props["events"]
                .as_array()
                .into_iter()
                .flatten()
                .map(|e| text(&e["description"]))
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("; ");

            let roads = strings(&props["roadNumbers"]);

            Some(Incident {
                id,
                position,
                category: incident_category(num(&props["iconCategory"])),
                severity: num(&props["magnitudeOfDelay"]).map(|m| m.clamp(0.0, 4.0) as u8).unwrap_or(0),
                description,
                road: (!roads.is_empty()).then(|| roads.join(", ")),
                delay_seconds: num(&props["delay"]).filter(|d| *d >= 0.0).map(|d| d as u32),
                starts_at: timestamp(&props["startTime"]),
                ends_at: timestamp(&props["endTime"]),
            })
        })
        .collect()
}

/// Normalizes a TomTom Traffic flow segment response
pub fn tomtom_flow(payload: &Value) -> Option<TrafficConditions> {
    let data = &payload["flowSegmentData"];
    let current = num(&data["currentSpeed"])?;
    let free_flow = num(&data["freeFlowSpeed"]).filter(|f| *f > 0.0)?;
    let road_closure = data["roadClosure"].as_bool().unwrap_or(false);

    let congestion = if road_closure {
        Congestion::Closed
    } else {
        match current / free_flow {
            r if r >= 0.75 => Congestion::Free,
            r if r >= 0.4 => Congestion::Moderate,
            _ => Congestion::Heavy,
        }
    };

    Some(TrafficConditions {
        current_speed_kmh: current,
        free_flow_speed_kmh: free_flow,
        confidence: num(&data["confidence"]).unwrap_or(0.0).clamp(0.0, 1.0),
        road_closure,
        congestion,
    })
}

/// Normalizes a roadworks feed
///
/// Accepts a GeoJSON feature collection, an open-data `{"results": [...]}`
/// envelope, or a bare array of records.
pub fn roadworks(payload: &Value) -> Vec<Roadwork> {
    let records = payload["features"]
        .as_array()
        .or_else(|| payload["results"].as_array())
        .or_else(|| payload.as_array());
    let Some(records) = records else {
        return Vec::new();
    };

    records
        .iter()
        .enumerate()
        .filter_map(|(i, record)| {
            let props = if record["properties"].is_object() {
                &record["properties"]
            } else {
                record
            };

            let position = first_coordinate(&record["geometry"]["coordinates"])
                .or_else(|| first_coordinate(&props["geom"]["geometry"]["coordinates"]))
                .or_else(|| position(&props["geo_point_2d"], "lat", "lon"))
                .or_else(|| position(props, "latitude", "longitude"))
                .or_else(|| position(props, "lat", "lon"));
            let Some(position) = position else {
                debug!(index = i, "Dropping roadworks record without a valid location");
                return None;
            };

            let id = first_text(props, &["id", "project_id", "objectid", "recordid"]);
            Some(Roadwork {
                id: if id.is_empty() { format!("roadwork-{}", i) } else { id },
                position,
                description: first_text(props, &["description", "project", "name", "title", "location"]),
                status: first_text(props, &["status", "phase"]),
                starts_at: timestamp(&props["start_date"]).or_else(|| timestamp(&props["startDate"])),
                ends_at: timestamp(&props["end_date"]).or_else(|| timestamp(&props["endDate"])),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tomtom_geocode_maps_address_and_poi() {
        let payload = json!({
            "summary": {"query": "city hall"},
            "results": [
                {
                    "type": "POI",
                    "score": 8.0,
                    "position": {"lat": 49.2609, "lon": -123.1139},
                    "poi": {
                        "name": "Vancouver City Hall",
                        "phone": "+1 604-873-7000",
                        "categories": ["government office"]
                    },
                    "address": {
                        "freeformAddress": "453 W 12th Ave, Vancouver BC V5Y 1V4",
                        "streetName": "W 12th Ave",
                        "streetNumber": "453",
                        "municipality": "Vancouver",
                        "postalCode": "V5Y 1V4",
                        "countryCode": "CA"
                    }
                },
                {
                    "type": "Street",
                    "score": 4.0,
                    "position": {"lat": 49.2611, "lon": -123.1150},
                    "address": {"freeformAddress": "W 12th Ave, Vancouver"}
                }
            ]
        });

        let candidates = tomtom_geocode(&payload);

        assert_eq!(candidates.len(), 2);
        let hall = &candidates[0];
        assert_eq!(hall.kind, CandidateKind::Poi);
        let poi = hall.poi.as_ref().unwrap();
        assert_eq!(poi.name, "Vancouver City Hall");
        assert_eq!(poi.website, "", "missing website defaults to empty");
        assert_eq!(poi.categories, vec!["government office".to_string()]);
        assert_eq!(hall.address.city, "Vancouver");
        assert_eq!(hall.relevance_score, 1.0);
        assert_eq!(hall.provider_rank, Some(0));

        let street = &candidates[1];
        assert_eq!(street.kind, CandidateKind::Address);
        assert!(street.poi.is_none());
        assert_eq!(street.address.postal_code, "");
        assert_eq!(street.relevance_score, 0.5);
    }

    #[test]
    fn test_tomtom_geocode_drops_malformed_entries() {
        let payload = json!({
            "results": [
                {"position": {"lat": "abc", "lon": -123.0}},
                {"position": {"lat": 49.0}},
                {"address": {"freeformAddress": "no position"}},
                {"position": {"lat": 200.0, "lon": 0.0}},
                {"position": {"lat": 49.0, "lon": -123.0}}
            ]
        });

        let candidates = tomtom_geocode(&payload);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].provider_rank, Some(4));
        assert_eq!(candidates[0].relevance_score, 0.0);
    }

    #[test]
    fn test_tomtom_geocode_tolerates_wrong_shape() {
        assert!(tomtom_geocode(&json!({"results": "nope"})).is_empty());
        assert!(tomtom_geocode(&json!(null)).is_empty());
    }

    #[test]
    fn test_tomtom_reverse_parses_position_string() {
        let payload = json!({
            "addresses": [
                {"position": "49.2827,-123.1207", "address": {"freeformAddress": "800 Robson St, Vancouver", "municipality": "Vancouver"}},
                {"position": "not a position", "address": {}}
            ]
        });

        let candidates = tomtom_reverse(&payload);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].position, LatLon { lat: 49.2827, lon: -123.1207 });
        assert_eq!(candidates[0].address.city, "Vancouver");
        assert_eq!(candidates[0].address.street, "");
    }

    #[test]
    fn test_nominatim_search_parses_string_coordinates() {
        let payload = json!([
            {
                "lat": "49.2827",
                "lon": "-123.1207",
                "display_name": "Vancouver General Hospital, 899 W 12th Ave, Vancouver",
                "category": "amenity",
                "type": "hospital",
                "name": "Vancouver General Hospital",
                "importance": 0.62,
                "address": {"road": "W 12th Ave", "city": "Vancouver", "country_code": "ca"},
                "extratags": {"website": "https://www.vch.ca"}
            },
            {
                "lat": "49.28",
                "lon": "-123.12",
                "display_name": "Main Street, Vancouver",
                "class": "highway",
                "type": "primary",
                "name": "Main Street",
                "address": {"town": "Vancouver"}
            },
            {"lat": "", "lon": "-123.12", "display_name": "broken"}
        ]);

        let candidates = nominatim_geocode(&payload);

        assert_eq!(candidates.len(), 2);
        let hospital = &candidates[0];
        assert_eq!(hospital.kind, CandidateKind::Poi);
        assert_eq!(hospital.address.country_code, "CA");
        let poi = hospital.poi.as_ref().unwrap();
        assert_eq!(poi.categories, vec!["amenity".to_string(), "hospital".to_string()]);
        assert_eq!(poi.website, "https://www.vch.ca");
        assert_eq!(poi.phone, "");
        assert!((hospital.relevance_score - 0.62).abs() < 1e-9);

        let street = &candidates[1];
        assert_eq!(street.kind, CandidateKind::Address);
        assert_eq!(street.address.city, "Vancouver");
        assert!(street.provider_rank.is_none());
    }

    #[test]
    fn test_nominatim_reverse_object_and_error() {
        let ok = json!({"lat": "49.0", "lon": "-123.0", "display_name": "Somewhere"});
        assert_eq!(nominatim_geocode(&ok).len(), 1);

        let err = json!({"error": "Unable to geocode"});
        assert!(nominatim_geocode(&err).is_empty());
    }

    #[test]
    fn test_tomtom_route_joins_legs_and_maps_guidance() {
        let payload = json!({
            "routes": [{
                "summary": {"lengthInMeters": 1520, "travelTimeInSeconds": 240},
                "legs": [
                    {"points": [
                        {"latitude": 49.28, "longitude": -123.12},
                        {"latitude": 49.281, "longitude": -123.121}
                    ]},
                    {"points": [
                        {"latitude": 49.281, "longitude": -123.121},
                        {"latitude": 49.29, "longitude": -123.13}
                    ]}
                ],
                "guidance": {"instructions": [
                    {"point": {"latitude": 49.28, "longitude": -123.12}, "maneuver": "DEPART", "message": "Leave"},
                    {"point": {"latitude": 49.281, "longitude": -123.121}, "maneuver": "TURN_LEFT", "message": "Turn left"},
                    {"point": {"latitude": 49.285, "longitude": -123.125}, "maneuver": "MOTORWAY_EXIT_RIGHT", "message": "Take the exit"},
                    {"point": {"latitude": 49.286, "longitude": -123.126}, "maneuver": "KEEP_RIGHT", "message": "Keep right"},
                    {"maneuver": "TURN_RIGHT", "message": "no point"}
                ]}
            }]
        });

        let routes = tomtom_route(&payload);

        assert_eq!(routes.len(), 1);
        let route = &routes[0];
        assert_eq!(route.points.len(), 3, "shared joint is not duplicated");
        assert_eq!(route.distance_m, Some(1520.0));
        assert_eq!(route.steps.len(), 4);
        assert_eq!(route.steps[1].kind, ManeuverKind::Turn);
        assert_eq!(route.steps[1].location, [-123.121, 49.281]);
        assert_eq!(route.steps[2].kind, ManeuverKind::Ramp);
        assert_eq!(route.steps[3].kind, ManeuverKind::Fork);
    }

    #[test]
    fn test_osrm_route_reads_geojson_and_steps() {
        let payload = json!({
            "code": "Ok",
            "routes": [{
                "distance": 2000.5,
                "duration": 300.0,
                "geometry": {"type": "LineString", "coordinates": [[-123.12, 49.28], [-123.13, 49.29], ["x", 1]]},
                "legs": [{"steps": [
                    {"name": "", "maneuver": {"type": "depart", "location": [-123.12, 49.28]}},
                    {"name": "Main Street", "maneuver": {"type": "turn", "modifier": "left", "location": [-123.125, 49.285]}},
                    {"name": "", "maneuver": {"type": "on ramp", "modifier": "slight right", "location": [-123.127, 49.287]}},
                    {"name": "", "maneuver": {"type": "arrive", "location": [-123.13, 49.29]}}
                ]}]
            }, {
                "geometry": {"coordinates": [[-123.0, 49.0]]}
            }]
        });

        let routes = osrm_route(&payload);

        assert_eq!(routes.len(), 1, "single-point route dropped");
        let route = &routes[0];
        assert_eq!(route.points.len(), 2);
        assert_eq!(route.steps[1].kind, ManeuverKind::Turn);
        assert_eq!(route.steps[1].instruction, "turn left onto Main Street");
        assert_eq!(route.steps[2].kind, ManeuverKind::Ramp);
        assert_eq!(route.steps[2].instruction, "on ramp slight right");
        assert_eq!(route.duration_s, Some(300.0));
    }

    #[test]
    fn test_tomtom_incidents_point_and_line_geometry() {
        let payload = json!({
            "incidents": [
                {
                    "type": "Feature",
                    "properties": {
                        "id": "abc123",
                        "iconCategory": 9,
                        "magnitudeOfDelay": 2,
                        "events": [{"description": "Roadworks"}, {"description": "Lane closed"}],
                        "roadNumbers": ["BC-99"],
                        "delay": 120,
                        "startTime": "2026-10-01T07:00:00Z",
                        "endTime": "2026-10-30"
                    },
                    "geometry": {"type": "LineString", "coordinates": [[-123.1, 49.2], [-123.2, 49.3]]}
                },
                {
                    "properties": {"iconCategory": 1},
                    "geometry": {"type": "Point", "coordinates": [-123.05, 49.25]}
                },
                {
                    "properties": {"id": "broken"},
                    "geometry": {"type": "Point", "coordinates": []}
                }
            ]
        });

        let incidents = tomtom_incidents(&payload);

        assert_eq!(incidents.len(), 2);
        let works = &incidents[0];
        assert_eq!(works.id, "abc123");
        assert_eq!(works.category, IncidentCategory::Roadworks);
        assert_eq!(works.position, LatLon { lat: 49.2, lon: -123.1 });
        assert_eq!(works.description, "Roadworks; Lane closed");
        assert_eq!(works.road.as_deref(), Some("BC-99"));
        assert_eq!(works.delay_seconds, Some(120));
        assert!(works.starts_at.is_some());
        assert!(works.ends_at.is_some());

        let crash = &incidents[1];
        assert_eq!(crash.id, "incident-1");
        assert_eq!(crash.category, IncidentCategory::Accident);
        assert_eq!(crash.severity, 0);
        assert!(crash.road.is_none());
    }

    #[test]
    fn test_tomtom_flow_congestion_levels() {
        let flow = |current: f64, closed: bool| {
            tomtom_flow(&json!({"flowSegmentData": {
                "currentSpeed": current, "freeFlowSpeed": 50, "confidence": 0.9, "roadClosure": closed
            }}))
            .unwrap()
        };

        assert_eq!(flow(45.0, false).congestion, Congestion::Free);
        assert_eq!(flow(25.0, false).congestion, Congestion::Moderate);
        assert_eq!(flow(10.0, false).congestion, Congestion::Heavy);
        assert_eq!(flow(45.0, true).congestion, Congestion::Closed);
        assert!(tomtom_flow(&json!({"flowSegmentData": {"currentSpeed": 10}})).is_none());
        assert!(tomtom_flow(&json!({"flowSegmentData": {"currentSpeed": 10, "freeFlowSpeed": 0}})).is_none());
    }

    #[test]
    fn test_roadworks_feature_collection() {
        let payload = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "properties": {"id": 17, "project": "Water main replacement", "status": "Active", "start_date": "2026-09-01"},
                    "geometry": {"type": "MultiLineString", "coordinates": [[[-123.1, 49.26], [-123.11, 49.27]]]}
                },
                {"properties": {"project": "No geometry"}}
            ]
        });

        let works = roadworks(&payload);

        assert_eq!(works.len(), 1);
        assert_eq!(works[0].id, "17");
        assert_eq!(works[0].description, "Water main replacement");
        assert_eq!(works[0].position, LatLon { lat: 49.26, lon: -123.1 });
        assert_eq!(works[0].starts_at.unwrap().to_rfc3339(), "2026-09-01T00:00:00+00:00");
        assert!(works[0].ends_at.is_none());
    }

    #[test]
    fn test_roadworks_open_data_results() {
        let payload = json!({
            "total_count": 2,
            "results": [
                {"project_id": "P-1", "location": "Granville St", "geo_point_2d": {"lat": 49.28, "lon": -123.12}},
                {"project_id": "P-2", "latitude": "49.29", "longitude": "-123.13", "status": "Planned"}
            ]
        });

        let works = roadworks(&payload);

        assert_eq!(works.len(), 2);
        assert_eq!(works[0].description, "Granville St");
        assert_eq!(works[0].status, "");
        assert_eq!(works[1].status, "Planned");
        assert_eq!(works[1].id, "P-2");
    }
}
