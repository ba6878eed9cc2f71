// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User mirror queries.

use chrono::NaiveDate;
use rusqlite::{OptionalExtension, params};
use tandem_core::clock::day_bounds;
use tandem_core::{Candidate, DEFAULT_SCORE, Location, TandemError, User, UserId};

use crate::database::{Database, map_tr_err};

/// Insert a user, or refresh the display name of an existing one.
pub async fn upsert_user(db: &Database, id: &UserId, display_name: &str) -> Result<(), TandemError> {
    let id = id.to_string();
    let display_name = display_name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO users (id, display_name) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name",
                params![id, display_name],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Set a user's location.
pub async fn set_location(
    db: &Database,
    id: &UserId,
    location: Location,
) -> Result<(), TandemError> {
    let key = id.to_string();
    let changed = db
        .connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE users SET latitude = ?1, longitude = ?2 WHERE id = ?3",
                params![location.lat, location.lon, key],
            )
        })
        .await
        .map_err(map_tr_err)?;
    if changed == 0 {
        return Err(TandemError::UnknownUser(id.to_string()));
    }
    Ok(())
}

/// Get a user by ID.
pub async fn get_user(db: &Database, id: &UserId) -> Result<Option<User>, TandemError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, display_name, latitude, longitude, created_at
                 FROM users WHERE id = ?1",
                params![id],
                |row| {
                    let lat: Option<f64> = row.get(2)?;
                    let lon: Option<f64> = row.get(3)?;
                    Ok(User {
                        id: UserId(row.get(0)?),
                        display_name: row.get(1)?,
                        location: lat.zip(lon).map(|(lat, lon)| Location { lat, lon }),
                        created_at: row.get(4)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Users with a location and no session started on `day`, with their score.
pub async fn list_unmatched_users(
    db: &Database,
    day: NaiveDate,
) -> Result<Vec<Candidate>, TandemError> {
    let (start, end) = day_bounds(day);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.latitude, u.longitude, COALESCE(e.score, ?3)
                 FROM users u
                 LEFT JOIN engagement_scores e ON e.user_id = u.id
                 WHERE u.latitude IS NOT NULL
                   AND u.longitude IS NOT NULL
                   AND NOT EXISTS (
                       SELECT 1 FROM chat_sessions s
                       WHERE (s.user1_id = u.id OR s.user2_id = u.id)
                         AND s.started_at >= ?1 AND s.started_at < ?2
                   )
                 ORDER BY u.id",
            )?;
            let rows = stmt.query_map(params![start, end, DEFAULT_SCORE], |row| {
                Ok(Candidate {
                    user_id: UserId(row.get(0)?),
                    location: Location {
                        lat: row.get(1)?,
                        lon: row.get(2)?,
                    },
                    score: row.get(3)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::sessions;
    use crate::queries::test_support::{seed_user, setup_db};
    use tandem_core::clock::today;

    #[tokio::test]
    async fn upsert_refreshes_display_name() {
        let (db, _dir) = setup_db().await;
        let id = UserId::from("u1");
        upsert_user(&db, &id, "Ann").await.unwrap();
        upsert_user(&db, &id, "Annie").await.unwrap();
        let user = get_user(&db, &id).await.unwrap().unwrap();
        assert_eq!(user.display_name, "Annie");
        assert!(user.location.is_none());
    }

    #[tokio::test]
    async fn set_location_on_unknown_user_fails() {
        let (db, _dir) = setup_db().await;
        let err = set_location(&db, &"ghost".into(), Location { lat: 1.0, lon: 2.0 })
            .await
            .unwrap_err();
        assert!(matches!(err, TandemError::UnknownUser(_)));
    }

    #[tokio::test]
    async fn unmatched_users_require_location_and_no_session_today() {
        let (db, _dir) = setup_db().await;
        let a = seed_user(&db, "a").await;
        let b = seed_user(&db, "b").await;
        let c = seed_user(&db, "c").await;
        let _no_location = seed_user(&db, "d").await;
        for id in [&a, &b, &c] {
            set_location(&db, id, Location { lat: 40.0, lon: -74.0 })
                .await
                .unwrap();
        }

        let listed = list_unmatched_users(&db, today()).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|c| c.user_id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
        assert!(listed.iter().all(|c| c.score == DEFAULT_SCORE));

        sessions::create_session(&db, &a, &b).await.unwrap();
        let listed = list_unmatched_users(&db, today()).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|c| c.user_id.as_str()).collect();
        assert_eq!(ids, ["c"]);
    }
}
