//! In-memory collaborators shared by the controller tests.

use std::{
    collections::{HashMap, HashSet},
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use chrono::NaiveDate;
use shared::{
    domain::{Gender, PostId, PreviewRef, UserId},
    protocol::{
        Credentials, NewAccount, PostRecord, ProfileRecord, ProfileSnapshot, TokenPair,
    },
};

use crate::{
    error::TransportError,
    intake::{CandidateFile, ImageProbe, IntakeRejection, PNG},
    preview::PreviewStore,
    remote::{MediaUpload, NewPost, ProfileUpdate, RemoteData},
    Liveness,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateAccount,
    Authenticate,
    FetchProfile,
    UpdateProfile,
    CreatePost,
    DeletePost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateAccount {
        account: NewAccount,
        avatar: Option<MediaUpload>,
    },
    Authenticate(Credentials),
    FetchProfile,
    UpdateProfile(ProfileUpdate),
    CreatePost(NewPost),
    DeletePost(PostId),
}

/// Service double that echoes updates into its own snapshot.
pub struct FakeRemote {
    snapshot: Mutex<ProfileSnapshot>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<Op, TransportError>>,
    tear_down_during: Mutex<Option<(Op, Liveness)>>,
    hanging: Mutex<HashSet<Op>>,
    next_post_id: AtomicUsize,
}

impl FakeRemote {
    pub fn new(snapshot: ProfileSnapshot) -> Arc<Self> {
        Arc::new(Self {
            snapshot: Mutex::new(snapshot),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            tear_down_during: Mutex::new(None),
            hanging: Mutex::new(HashSet::new()),
            next_post_id: AtomicUsize::new(100),
        })
    }

    pub fn fail(&self, op: Op, err: TransportError) {
        self.failures.lock().expect("lock").insert(op, err);
    }

    pub fn recover(&self, op: Op) {
        self.failures.lock().expect("lock").remove(&op);
        self.hanging.lock().expect("lock").remove(&op);
    }

    /// Calls to `op` are recorded and then never resolve.
    pub fn hang(&self, op: Op) {
        self.hanging.lock().expect("lock").insert(op);
    }

    /// Flips `liveness` while `op` is in flight, as a navigation away would.
    pub fn tear_down_during(&self, op: Op, liveness: Liveness) {
        *self.tear_down_during.lock().expect("lock") = Some((op, liveness));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("lock").clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls()
            .iter()
            .filter(|call| Self::op_of(call) == op)
            .count()
    }

    pub fn server_profile(&self) -> ProfileRecord {
        self.snapshot.lock().expect("lock").profile.clone()
    }

    fn op_of(call: &Call) -> Op {
        match call {
            Call::CreateAccount { .. } => Op::CreateAccount,
            Call::Authenticate(_) => Op::Authenticate,
            Call::FetchProfile => Op::FetchProfile,
            Call::UpdateProfile(_) => Op::UpdateProfile,
            Call::CreatePost(_) => Op::CreatePost,
            Call::DeletePost(_) => Op::DeletePost,
        }
    }

    async fn enter(&self, call: Call) -> Result<(), TransportError> {
        let op = Self::op_of(&call);
        self.calls.lock().expect("lock").push(call);
        let hangs = self.hanging.lock().expect("lock").contains(&op);
        if hangs {
            std::future::pending::<()>().await;
        }
        if let Some((target, liveness)) = self.tear_down_during.lock().expect("lock").as_ref() {
            if *target == op {
                liveness.tear_down();
            }
        }
        match self.failures.lock().expect("lock").get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteData for FakeRemote {
    async fn create_account(
        &self,
        account: NewAccount,
        avatar: Option<MediaUpload>,
    ) -> Result<ProfileRecord, TransportError> {
        self.enter(Call::CreateAccount {
            account: account.clone(),
            avatar,
        })
        .await?;
        Ok(ProfileRecord {
            id: UserId(77),
            name: account.name,
            email: account.email,
            birth_date: account.birth_date,
            gender: account.gender,
            avatar: None,
        })
    }

    async fn authenticate(&self, credentials: Credentials) -> Result<TokenPair, TransportError> {
        self.enter(Call::Authenticate(credentials)).await?;
        Ok(TokenPair {
            access: "access-token".to_string(),
            refresh: "refresh-token".to_string(),
        })
    }

    async fn fetch_profile(&self) -> Result<ProfileSnapshot, TransportError> {
        self.enter(Call::FetchProfile).await?;
        Ok(self.snapshot.lock().expect("lock").clone())
    }

    async fn update_profile(&self, update: ProfileUpdate) -> Result<ProfileRecord, TransportError> {
        self.enter(Call::UpdateProfile(update.clone())).await?;
        let mut snapshot = self.snapshot.lock().expect("lock");
        let changes = update.changes();
        if let Some(name) = &changes.name {
            snapshot.profile.name = name.trim().to_string();
        }
        if let Some(birth_date) = changes.birth_date {
            snapshot.profile.birth_date = birth_date;
        }
        if let Some(gender) = changes.gender {
            snapshot.profile.gender = gender;
        }
        if let ProfileUpdate::Multipart { avatar, .. } = &update {
            snapshot.profile.avatar = Some(format!("/media/avatars/{}", avatar.filename));
        }
        Ok(snapshot.profile.clone())
    }

    async fn create_post(&self, post: NewPost) -> Result<PostRecord, TransportError> {
        self.enter(Call::CreatePost(post.clone())).await?;
        let id = self.next_post_id.fetch_add(1, Ordering::SeqCst) as i64;
        let created = PostRecord {
            id: PostId(id),
            image: Some(format!("/media/posts/{}", post.image.filename)),
            caption: post.caption,
            like_count: 0,
            dislike_count: 0,
            created_at: "2024-06-01T00:00:00Z".parse().expect("timestamp"),
        };
        self.snapshot
            .lock()
            .expect("lock")
            .posts
            .insert(0, created.clone());
        Ok(created)
    }

    async fn delete_post(&self, post_id: PostId) -> Result<(), TransportError> {
        self.enter(Call::DeletePost(post_id)).await?;
        self.snapshot
            .lock()
            .expect("lock")
            .posts
            .retain(|post| post.id != post_id);
        Ok(())
    }
}

/// Probe returning a fixed answer and counting how often it was asked.
pub struct FixedProbe {
    answer: Result<(u32, u32), IntakeRejection>,
    calls: AtomicUsize,
}

impl FixedProbe {
    pub fn dimensions(width: u32, height: u32) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok((width, height)),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn unreadable() -> Arc<Self> {
        Arc::new(Self {
            answer: Err(IntakeRejection::Unreadable),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageProbe for FixedProbe {
    async fn dimensions(&self, _bytes: Arc<[u8]>) -> Result<(u32, u32), IntakeRejection> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

#[derive(Default)]
struct PreviewLedger {
    created: usize,
    released: usize,
    max_live: usize,
    double_release: bool,
    live: Vec<PreviewRef>,
}

/// Preview store that records every creation and release.
#[derive(Default)]
pub struct CountingPreviews {
    ledger: Mutex<PreviewLedger>,
}

impl CountingPreviews {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created(&self) -> usize {
        self.ledger.lock().expect("lock").created
    }

    pub fn released(&self) -> usize {
        self.ledger.lock().expect("lock").released
    }

    pub fn live(&self) -> usize {
        self.ledger.lock().expect("lock").live.len()
    }

    pub fn max_live(&self) -> usize {
        self.ledger.lock().expect("lock").max_live
    }

    pub fn saw_double_release(&self) -> bool {
        self.ledger.lock().expect("lock").double_release
    }
}

impl PreviewStore for CountingPreviews {
    fn create(&self, _media_type: &str, _bytes: &[u8]) -> PreviewRef {
        let mut ledger = self.ledger.lock().expect("lock");
        ledger.created += 1;
        let reference = PreviewRef(format!("blob:test-{}", ledger.created));
        ledger.live.push(reference.clone());
        ledger.max_live = ledger.max_live.max(ledger.live.len());
        reference
    }

    fn release(&self, reference: &PreviewRef) {
        let mut ledger = self.ledger.lock().expect("lock");
        ledger.released += 1;
        match ledger.live.iter().position(|live| live == reference) {
            Some(index) => {
                ledger.live.remove(index);
            }
            None => ledger.double_release = true,
        }
    }
}

pub fn sample_profile() -> ProfileRecord {
    ProfileRecord {
        id: UserId(4),
        name: "Bruce Wayne".to_string(),
        email: "bruce@example.com".to_string(),
        birth_date: NaiveDate::from_ymd_opt(1990, 2, 19),
        gender: Some(Gender::Male),
        avatar: Some("/media/avatars/bruce.png".to_string()),
    }
}

pub fn sample_post(id: i64) -> PostRecord {
    PostRecord {
        id: PostId(id),
        image: Some(format!("/media/posts/{id}.png")),
        caption: format!("post {id}"),
        like_count: 1,
        dislike_count: 0,
        created_at: "2024-05-01T10:00:00Z".parse().expect("timestamp"),
    }
}

pub fn sample_snapshot() -> ProfileSnapshot {
    ProfileSnapshot {
        profile: sample_profile(),
        posts: vec![sample_post(1), sample_post(2), sample_post(3)],
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::new(width, height);
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(image)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode png");
    out.into_inner()
}

pub fn png_file(name: &str, len: usize) -> CandidateFile {
    CandidateFile::new(name, PNG, vec![0u8; len])
}

pub fn transport_failure(status: u16) -> TransportError {
    TransportError::status(status, Some("Server said no.".to_string()))
}
