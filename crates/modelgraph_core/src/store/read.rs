//! Relationship reads and fetch completion.

use crate::fetch::{
    DerefToken, FetchError, FetchFailure, FetchRequest, FetchTicket, LoaderReply, ReadOutcome,
    ReadStatus,
};
use crate::graph::{Layer, Members, SideKey};
use crate::model::payload::{Document, ResourceRef};
use crate::model::record::RecordLid;
use crate::store::{Store, StoreError, StoreResult};
use log::{debug, info, warn};

impl Store {
    /// Reads a relationship, fetching through the loader when needed.
    ///
    /// A second read of a side that is already fetching returns the same
    /// token without issuing another request.
    ///
    /// # Errors
    /// - `UnknownRecord`, `UnknownRelationship`.
    /// - `RelationshipNotLoaded` for a synchronous relationship whose
    ///   members are not all loaded.
    pub fn read(&mut self, lid: RecordLid, field: &str) -> StoreResult<DerefToken> {
        let model = self.model_of(lid)?;
        let definition = self.definition(&model, field)?;
        let side = SideKey::new(lid, field);

        if let Some(ticket) = self.fetches.in_flight(&side) {
            debug!(
                "event=read_chained module=store status=ok ticket={} field={}",
                ticket, field
            );
            return Ok(self.fetches.token(ticket));
        }

        let Some(state) = self.graph.ensure_side(&self.schema, &side, &model) else {
            return Err(StoreError::UnknownRelationship {
                model,
                field: field.to_string(),
            });
        };
        let local = state.local().clone();
        let unloaded = local
            .as_slice()
            .iter()
            .any(|member| !self.identity.get(*member).is_some_and(|r| r.is_loaded()));

        if !definition.is_async {
            if unloaded {
                return Err(StoreError::RelationshipNotLoaded {
                    model,
                    field: field.to_string(),
                });
            }
            let ticket = self.fetches.resolved(&side, local);
            return Ok(self.fetches.token(ticket));
        }

        let needs_fetch = state.needs_reload()
            || unloaded
            || (!state.has_any_data() && state.related_link().is_some());
        if !needs_fetch {
            let ticket = self.fetches.resolved(&side, local);
            return Ok(self.fetches.token(ticket));
        }

        let related_link = state.related_link().map(str::to_string);
        let known = local
            .as_slice()
            .iter()
            .filter_map(|member| self.identity.get(*member))
            .filter_map(|record| Some(ResourceRef::new(record.model(), record.id()?)))
            .collect();
        let owner = self.record(lid)?.identity();
        let ticket = self.fetches.begin(&side);
        let request = FetchRequest {
            ticket,
            owner,
            relationship: field.to_string(),
            kind: definition.kind,
            target: definition.target.clone(),
            related_link,
            known,
        };
        info!(
            "event=fetch_issued module=store status=ok ticket={} model={} field={}",
            ticket, model, field
        );

        match self.loader.fetch_related(&request) {
            LoaderReply::Ready(result) => {
                self.settle_fetch(ticket, result)?;
            }
            LoaderReply::Deferred => {
                debug!(
                    "event=fetch_deferred module=store status=ok ticket={}",
                    ticket
                );
            }
        }
        Ok(self.fetches.token(ticket))
    }

    /// Reports the state of a read.
    ///
    /// # Errors
    /// - `InvalidReference` for tokens this store did not mint or no longer
    ///   retains.
    pub fn poll_read(&self, token: &DerefToken) -> StoreResult<ReadOutcome> {
        self.fetches
            .lookup(token)
            .map(|entry| entry.outcome())
            .ok_or(StoreError::InvalidReference)
    }

    /// Delivers a deferred loader answer.
    ///
    /// A superseded read still materializes the returned records but leaves
    /// the side and its dependent assignments alone.
    ///
    /// # Errors
    /// - `UnknownFetch` when no read is waiting for `ticket`.
    /// - Push validation errors for an unusable document (the read fails).
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Option<Document>, FetchError>,
    ) -> StoreResult<ReadOutcome> {
        self.settle_fetch(ticket, result)
    }

    fn settle_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Option<Document>, FetchError>,
    ) -> StoreResult<ReadOutcome> {
        let (side, status) = match self.fetches.entry(ticket) {
            Some(entry) => (entry.side.clone(), entry.status),
            None => return Err(StoreError::UnknownFetch(ticket)),
        };
        if !matches!(status, ReadStatus::Fetching | ReadStatus::Superseded) {
            return Err(StoreError::UnknownFetch(ticket));
        }

        let document = match result {
            Ok(document) => document,
            Err(error) => return Ok(self.fail_read(ticket, &side, error)),
        };
        if let Some(document) = &document {
            if let Err(err) = self.validate_document(document) {
                self.fail_read(ticket, &side, FetchError::InvalidPayload(err.to_string()));
                return Err(err);
            }
            self.apply_document(document);
        }

        if status == ReadStatus::Superseded {
            debug!(
                "event=fetch_result_dropped module=store status=skipped ticket={}",
                ticket
            );
            return Ok(ReadOutcome::Superseded);
        }

        let model = self.model_of(side.record)?;
        let kind = self
            .graph
            .get(&side)
            .map(|state| state.kind())
            .ok_or_else(|| StoreError::UnknownRelationship {
                model: model.clone(),
                field: side.field.clone(),
            })?;
        let related = document
            .as_ref()
            .map(|document| {
                document
                    .linkage()
                    .refs()
                    .iter()
                    .filter_map(|reference| self.identity.lid_for(&reference.model, &reference.id))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let mut changes = self.apply_canonical(&side, &model, Members::from_lids(kind, related));
        let value = self
            .graph
            .get(&side)
            .map(|state| state.local().clone())
            .unwrap_or_else(|| Members::empty(kind));

        let waiters = self.fetches.resolve(ticket, value.clone());
        let mut origins = vec![side.clone()];
        for waiter in waiters {
            let target_kind = self
                .graph
                .get(&waiter.target)
                .map(|state| state.kind())
                .unwrap_or(kind);
            let members = Members::from_lids(target_kind, value.as_slice().to_vec());
            let applied = self.graph.replace(
                &self.schema,
                Layer::Local,
                &waiter.target,
                &waiter.model,
                members,
            );
            self.edits.touch(waiter.initiator, applied.sides());
            changes.merge(applied);
            origins.push(waiter.target);
        }
        self.publish_changes(&changes, &origins);
        info!(
            "event=fetch_resolved module=store status=ok ticket={} members={}",
            ticket,
            value.len()
        );
        Ok(ReadOutcome::Ready(value))
    }

    fn fail_read(&mut self, ticket: FetchTicket, side: &SideKey, error: FetchError) -> ReadOutcome {
        let failure = FetchFailure {
            ticket,
            record: side.record,
            field: side.field.clone(),
            error,
        };
        warn!(
            "event=fetch_failed module=store status=error ticket={} field={} error={}",
            ticket, side.field, failure.error
        );
        let fetching =
            self.fetches.entry(ticket).map(|entry| entry.status) == Some(ReadStatus::Fetching);
        if !fetching {
            return ReadOutcome::Superseded;
        }
        if let Some(state) = self.graph.get_mut(side) {
            state.mark_stale();
        }
        self.fetches.fail(ticket, failure.clone());
        ReadOutcome::Failed(failure)
    }
}
