use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use log::{debug, info};

use crate::platform::{CachingLogic, MATCH_UNINSTALLED_PACKAGES};

use super::engine::IconCache;
use super::entry::{ComponentName, UserHandle};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub updated: usize,
    pub removed: usize,
    pub unchanged: usize,
}

/// Re-validates persisted rows against live app data.
///
/// Feed it every live object type with [`UpdateHandler::update_icons`], then
/// call [`UpdateHandler::finish`] to delete rows nothing claimed. Stale rows
/// are those whose version, update time or system fingerprint no longer match.
/// Must be driven on the cache's worker.
pub struct UpdateHandler {
    cache: Arc<IconCache>,
    /// (flattened component, profile serial) pairs some live object still backs
    seen: HashSet<(String, i64)>,
    users: HashMap<i64, UserHandle>,
    summary: UpdateSummary,
}

impl UpdateHandler {
    pub(crate) fn new(cache: Arc<IconCache>) -> Self {
        Self {
            cache,
            seen: HashSet::new(),
            users: HashMap::new(),
            summary: UpdateSummary::default(),
        }
    }

    pub fn update_icons<T, L>(&mut self, objects: &[T], logic: &L) -> Result<()>
    where
        L: CachingLogic<T> + ?Sized,
    {
        let mut rows_by_serial = HashMap::new();

        for object in objects {
            let component = logic.component(object);
            let user = logic.user(object);
            let serial = self.cache.directory().serial_number_for_user(user);
            self.users.insert(serial, user);

            let Some(info) = self
                .cache
                .directory()
                .package_info(component.package(), user, 0)
            else {
                debug!("Skipping {component}: package not installed for {user}");
                continue;
            };

            let flat = component.flatten();
            if !self.seen.insert((flat.clone(), serial)) {
                continue;
            }

            if !rows_by_serial.contains_key(&serial) {
                let rows = self
                    .cache
                    .rows_for_profile(serial)?
                    .into_iter()
                    .map(|row| (row.component.clone(), row))
                    .collect::<HashMap<_, _>>();
                rows_by_serial.insert(serial, rows);
            }

            let fresh = rows_by_serial
                .get(&serial)
                .and_then(|rows| rows.get(&flat))
                .is_some_and(|row| {
                    row.version == info.version_code
                        && row.last_updated == logic.last_updated(object, &info)
                        && row.system_state.as_deref()
                            == Some(self.cache.package_fingerprint(component.package()).as_str())
                });

            if fresh {
                self.summary.unchanged += 1;
            } else if self
                .cache
                .add_icon_to_db_and_mem_cache(object, logic, &info, serial, true)
            {
                self.summary.updated += 1;
            }
        }

        Ok(())
    }

    /// Deletes rows of every visited profile that no live object claimed.
    /// Package-level rows survive while their package is installed.
    pub fn finish(self) -> Result<UpdateSummary> {
        let mut summary = self.summary;

        for (&serial, &user) in &self.users {
            for row in self.cache.rows_for_profile(serial)? {
                if self.seen.contains(&(row.component.clone(), serial)) {
                    continue;
                }

                let keep = ComponentName::unflatten(&row.component).is_some_and(|component| {
                    component.is_package_default()
                        && self
                            .cache
                            .directory()
                            .package_info(component.package(), user, MATCH_UNINSTALLED_PACKAGES)
                            .is_some()
                });
                if keep {
                    continue;
                }

                debug!("Removing obsolete icon row {}", row.component);
                self.cache.remove_row(&row.component, user, serial)?;
                summary.removed += 1;
            }
        }

        info!(
            "Icon cache update finished: {} updated, {} removed, {} unchanged",
            summary.updated, summary.removed, summary.unchanged
        );
        Ok(summary)
    }
}
