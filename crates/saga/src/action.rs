//! Saga actions and their static routing table.
//!
//! Every action belongs to exactly one [`Domain`], which fixes the command
//! topic the step is sent to and the status topic its outcome arrives on.
//! [`ActionContract`] lists the command `type` and the status `type`s counted as
//! success or failure; adding an action means extending both the enum and
//! [`ActionKind::contract`]. Await-only actions send no command and complete
//! on a status event another party causes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A domain service reachable over a command/status topic pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Inventory,
    Asset,
    Character,
    Buff,
    Quest,
    Skill,
    Monster,
    Guild,
    Storage,
    CashShop,
    BuddyList,
    Pet,
    Invite,
    Consumable,
    Portal,
    Transport,
    Drop,
}

impl Domain {
    pub const ALL: [Domain; 17] = [
        Domain::Inventory,
        Domain::Asset,
        Domain::Character,
        Domain::Buff,
        Domain::Quest,
        Domain::Skill,
        Domain::Monster,
        Domain::Guild,
        Domain::Storage,
        Domain::CashShop,
        Domain::BuddyList,
        Domain::Pet,
        Domain::Invite,
        Domain::Consumable,
        Domain::Portal,
        Domain::Transport,
        Domain::Drop,
    ];

    /// Environment variable naming the domain's command topic.
    pub fn command_topic(&self) -> &'static str {
        match self {
            Domain::Inventory => "COMMAND_TOPIC_INVENTORY",
            Domain::Asset => "COMMAND_TOPIC_ASSET",
            Domain::Character => "COMMAND_TOPIC_CHARACTER",
            Domain::Buff => "COMMAND_TOPIC_CHARACTER_BUFF",
            Domain::Quest => "COMMAND_TOPIC_QUEST",
            Domain::Skill => "COMMAND_TOPIC_SKILL",
            Domain::Monster => "COMMAND_TOPIC_MONSTER",
            Domain::Guild => "COMMAND_TOPIC_GUILD",
            Domain::Storage => "COMMAND_TOPIC_STORAGE",
            Domain::CashShop => "COMMAND_TOPIC_CASH_COMPARTMENT",
            Domain::BuddyList => "COMMAND_TOPIC_BUDDY_LIST",
            Domain::Pet => "COMMAND_TOPIC_PET",
            Domain::Invite => "COMMAND_TOPIC_INVITE",
            Domain::Consumable => "COMMAND_TOPIC_CONSUMABLE",
            Domain::Portal => "COMMAND_TOPIC_PORTAL",
            Domain::Transport => "COMMAND_TOPIC_TRANSPORT",
            Domain::Drop => "COMMAND_TOPIC_DROP",
        }
    }

    /// Environment variable naming the domain's status topic.
    pub fn status_topic(&self) -> &'static str {
        match self {
            Domain::Inventory => "EVENT_TOPIC_INVENTORY_STATUS",
            Domain::Asset => "EVENT_TOPIC_ASSET_STATUS",
            Domain::Character => "EVENT_TOPIC_CHARACTER_STATUS",
            Domain::Buff => "EVENT_TOPIC_CHARACTER_BUFF_STATUS",
            Domain::Quest => "EVENT_TOPIC_QUEST_STATUS",
            Domain::Skill => "EVENT_TOPIC_SKILL_STATUS",
            Domain::Monster => "EVENT_TOPIC_MONSTER_STATUS",
            Domain::Guild => "EVENT_TOPIC_GUILD_STATUS",
            Domain::Storage => "EVENT_TOPIC_STORAGE_STATUS",
            Domain::CashShop => "EVENT_TOPIC_CASH_COMPARTMENT_STATUS",
            Domain::BuddyList => "EVENT_TOPIC_BUDDY_LIST_STATUS",
            Domain::Pet => "EVENT_TOPIC_PET_STATUS",
            Domain::Invite => "EVENT_TOPIC_INVITE_STATUS",
            Domain::Consumable => "EVENT_TOPIC_CONSUMABLE_STATUS",
            Domain::Portal => "EVENT_TOPIC_PORTAL_STATUS",
            Domain::Transport => "EVENT_TOPIC_TRANSPORT_STATUS",
            Domain::Drop => "EVENT_TOPIC_DROP_STATUS",
        }
    }
}

/// How a status event relates to the action it answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Routing and outcome contract for one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionContract {
    pub domain: Domain,
    /// Envelope `type` of the command; `None` for await-only actions.
    pub command_type: Option<&'static str>,
    /// Status `type`s that complete the step.
    pub success: &'static [&'static str],
    /// Status `type`s that fail the step.
    pub failure: &'static [&'static str],
}

impl ActionContract {
    pub fn sends_command(&self) -> bool {
        self.command_type.is_some()
    }

    /// Classifies a status event type; `None` when it answers some other action.
    pub fn classify(&self, status_type: &str) -> Option<Outcome> {
        if self.success.contains(&status_type) {
            Some(Outcome::Success)
        } else if self.failure.contains(&status_type) {
            Some(Outcome::Failure)
        } else {
            None
        }
    }
}

const ERROR: &[&str] = &["ERROR"];

const fn entry(
    domain: Domain,
    command_type: &'static str,
    success: &'static [&'static str],
    failure: &'static [&'static str],
) -> ActionContract {
    ActionContract {
        domain,
        command_type: Some(command_type),
        success,
        failure,
    }
}

const fn awaits(
    domain: Domain,
    success: &'static [&'static str],
    failure: &'static [&'static str],
) -> ActionContract {
    ActionContract {
        domain,
        command_type: None,
        success,
        failure,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveItemPayload {
    pub character_id: u32,
    pub template_id: u32,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumeItemPayload {
    pub character_id: u32,
    pub slot: i16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelReservationPayload {
    pub character_id: u32,
    pub template_id: u32,
    pub quantity: u32,
    /// Filled from the reservation step's result when compensating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyAssetPayload {
    pub character_id: u32,
    pub template_id: u32,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssetPayload {
    pub character_id: u32,
    pub template_id: u32,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAssetPayload {
    pub character_id: u32,
    pub template_id: u32,
    /// Filled from the creating step's result when compensating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MesoPayload {
    pub character_id: u32,
    pub world_id: u8,
    /// Always positive; the action decides the sign on the wire.
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamePayload {
    pub character_id: u32,
    pub world_id: u8,
    pub amount: i16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperiencePayload {
    pub character_id: u32,
    pub world_id: u8,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelPayload {
    pub character_id: u32,
    pub world_id: u8,
    pub amount: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeJobPayload {
    pub character_id: u32,
    pub world_id: u8,
    pub job_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WarpToPortalPayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub map_id: u32,
    pub portal_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCharacterPayload {
    pub account_id: u32,
    pub world_id: u8,
    pub name: String,
    pub job_id: u16,
    pub gender: u8,
    pub face: u32,
    pub hair: u32,
    pub skin: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantBuffPayload {
    pub character_id: u32,
    pub source_id: i32,
    pub level: u8,
    pub duration_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelBuffPayload {
    pub character_id: u32,
    pub source_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestPayload {
    pub character_id: u32,
    pub quest_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub npc_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillPayload {
    pub character_id: u32,
    pub skill_id: u32,
    pub level: u8,
    pub master_level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnMonsterPayload {
    pub world_id: u8,
    pub channel_id: u8,
    pub map_id: u32,
    pub monster_id: u32,
    pub x: i16,
    pub y: i16,
    pub count: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildNamePayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageTransferPayload {
    pub account_id: u32,
    pub character_id: u32,
    pub world_id: u8,
    pub asset_id: u32,
    pub template_id: u32,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashShopTransferPayload {
    pub account_id: u32,
    pub character_id: u32,
    pub compartment_type: u8,
    pub asset_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuddyCapacityPayload {
    pub character_id: u32,
    pub world_id: u8,
    pub amount: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosenessPayload {
    pub character_id: u32,
    pub pet_id: u32,
    pub amount: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitePayload {
    pub invite_type: String,
    pub world_id: u8,
    pub originator_id: u32,
    pub target_id: u32,
    pub reference_id: u32,
}

/// Moves an asset between an inventory slot and an equipped slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentMovePayload {
    pub character_id: u32,
    pub inventory_type: u8,
    pub source: i16,
    /// Negative for equipped slots.
    pub destination: i16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAndEquipAssetPayload {
    pub character_id: u32,
    pub template_id: u32,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestroyAssetFromSlotPayload {
    pub character_id: u32,
    pub inventory_type: u8,
    /// Filled from the creating step's result when compensating.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<i16>,
    pub quantity: u32,
}

/// Hair, face or skin change. A known previous style makes the change
/// reversible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StylePayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub style_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_style_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionPayload {
    pub condition_type: String,
    pub operator: String,
    pub value: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCharacterStatePayload {
    pub character_id: u32,
    pub conditions: Vec<ConditionPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwaitCharacterCreatedPayload {
    pub account_id: u32,
    pub world_id: u8,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyPayload {
    pub character_id: u32,
    pub account_id: u32,
    /// 1 credit, 2 points, 3 prepaid.
    pub currency_type: u8,
    /// Negative amounts deduct.
    pub amount: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomPortalPayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub map_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAllBuffsPayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub map_id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceTransportPayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub route_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactorDropsPayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub map_id: u32,
    pub reactor_id: u32,
    pub classification: String,
    pub x: i16,
    pub y: i16,
    /// `drop` for all at once, `spray` for staggered.
    pub drop_type: String,
    pub meso: bool,
    pub meso_chance: u32,
    pub meso_min: u32,
    pub meso_max: u32,
    pub min_items: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumableEffectPayload {
    pub character_id: u32,
    pub world_id: u8,
    pub channel_id: u8,
    pub item_id: u32,
}

/// Inventory type holding equipment.
const EQUIP_INVENTORY: u8 = 1;

impl EquipmentMovePayload {
    fn swapped(&self) -> Self {
        Self {
            source: self.destination,
            destination: self.source,
            ..self.clone()
        }
    }
}

impl StylePayload {
    fn reverted(&self) -> Option<Self> {
        Some(Self {
            style_id: self.previous_style_id?,
            previous_style_id: Some(self.style_id),
            ..self.clone()
        })
    }
}

/// A cross-service effect with its typed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Action {
    ReserveItem(ReserveItemPayload),
    ConsumeItem(ConsumeItemPayload),
    CancelReservation(CancelReservationPayload),
    DestroyAsset(DestroyAssetPayload),
    CreateAsset(CreateAssetPayload),
    DeleteAsset(DeleteAssetPayload),
    AwardMesos(MesoPayload),
    DeductMesos(MesoPayload),
    AwardFame(FamePayload),
    AwardExperience(ExperiencePayload),
    DeductExperience(ExperiencePayload),
    AwardLevel(LevelPayload),
    ChangeJob(ChangeJobPayload),
    WarpToPortal(WarpToPortalPayload),
    CreateCharacter(CreateCharacterPayload),
    GrantBuff(GrantBuffPayload),
    CancelBuff(CancelBuffPayload),
    StartQuest(QuestPayload),
    CompleteQuest(QuestPayload),
    ForfeitQuest(QuestPayload),
    CreateSkill(SkillPayload),
    UpdateSkill(SkillPayload),
    SpawnMonster(SpawnMonsterPayload),
    RequestGuildName(GuildNamePayload),
    AcceptToStorage(StorageTransferPayload),
    ReleaseFromStorage(StorageTransferPayload),
    AcceptToCashShop(CashShopTransferPayload),
    ReleaseFromCashShop(CashShopTransferPayload),
    IncreaseBuddyCapacity(BuddyCapacityPayload),
    GainCloseness(ClosenessPayload),
    CreateInvite(InvitePayload),
    EquipAsset(EquipmentMovePayload),
    UnequipAsset(EquipmentMovePayload),
    CreateAndEquipAsset(CreateAndEquipAssetPayload),
    DestroyAssetFromSlot(DestroyAssetFromSlotPayload),
    ChangeHair(StylePayload),
    ChangeFace(StylePayload),
    ChangeSkin(StylePayload),
    ValidateCharacterState(ValidateCharacterStatePayload),
    AwaitCharacterCreated(AwaitCharacterCreatedPayload),
    AwardCurrency(CurrencyPayload),
    WarpToRandomPortal(RandomPortalPayload),
    CancelAllBuffs(CancelAllBuffsPayload),
    StartInstanceTransport(InstanceTransportPayload),
    SpawnReactorDrops(ReactorDropsPayload),
    ApplyConsumableEffect(ConsumableEffectPayload),
}

/// Payload-free discriminant of [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    ReserveItem,
    ConsumeItem,
    CancelReservation,
    DestroyAsset,
    CreateAsset,
    DeleteAsset,
    AwardMesos,
    DeductMesos,
    AwardFame,
    AwardExperience,
    DeductExperience,
    AwardLevel,
    ChangeJob,
    WarpToPortal,
    CreateCharacter,
    GrantBuff,
    CancelBuff,
    StartQuest,
    CompleteQuest,
    ForfeitQuest,
    CreateSkill,
    UpdateSkill,
    SpawnMonster,
    RequestGuildName,
    AcceptToStorage,
    ReleaseFromStorage,
    AcceptToCashShop,
    ReleaseFromCashShop,
    IncreaseBuddyCapacity,
    GainCloseness,
    CreateInvite,
    EquipAsset,
    UnequipAsset,
    CreateAndEquipAsset,
    DestroyAssetFromSlot,
    ChangeHair,
    ChangeFace,
    ChangeSkin,
    ValidateCharacterState,
    AwaitCharacterCreated,
    AwardCurrency,
    WarpToRandomPortal,
    CancelAllBuffs,
    StartInstanceTransport,
    SpawnReactorDrops,
    ApplyConsumableEffect,
}

impl ActionKind {
    pub const ALL: [ActionKind; 46] = [
        ActionKind::ReserveItem,
        ActionKind::ConsumeItem,
        ActionKind::CancelReservation,
        ActionKind::DestroyAsset,
        ActionKind::CreateAsset,
        ActionKind::DeleteAsset,
        ActionKind::AwardMesos,
        ActionKind::DeductMesos,
        ActionKind::AwardFame,
        ActionKind::AwardExperience,
        ActionKind::DeductExperience,
        ActionKind::AwardLevel,
        ActionKind::ChangeJob,
        ActionKind::WarpToPortal,
        ActionKind::CreateCharacter,
        ActionKind::GrantBuff,
        ActionKind::CancelBuff,
        ActionKind::StartQuest,
        ActionKind::CompleteQuest,
        ActionKind::ForfeitQuest,
        ActionKind::CreateSkill,
        ActionKind::UpdateSkill,
        ActionKind::SpawnMonster,
        ActionKind::RequestGuildName,
        ActionKind::AcceptToStorage,
        ActionKind::ReleaseFromStorage,
        ActionKind::AcceptToCashShop,
        ActionKind::ReleaseFromCashShop,
        ActionKind::IncreaseBuddyCapacity,
        ActionKind::GainCloseness,
        ActionKind::CreateInvite,
        ActionKind::EquipAsset,
        ActionKind::UnequipAsset,
        ActionKind::CreateAndEquipAsset,
        ActionKind::DestroyAssetFromSlot,
        ActionKind::ChangeHair,
        ActionKind::ChangeFace,
        ActionKind::ChangeSkin,
        ActionKind::ValidateCharacterState,
        ActionKind::AwaitCharacterCreated,
        ActionKind::AwardCurrency,
        ActionKind::WarpToRandomPortal,
        ActionKind::CancelAllBuffs,
        ActionKind::StartInstanceTransport,
        ActionKind::SpawnReactorDrops,
        ActionKind::ApplyConsumableEffect,
    ];

    /// The static routing and outcome table.
    pub fn contract(&self) -> ActionContract {
        use ActionKind::*;

        match self {
            ReserveItem => entry(Domain::Inventory, "REQUEST_RESERVE", &["RESERVED"], ERROR),
            ConsumeItem => entry(Domain::Inventory, "CONSUME", &["CONSUMED"], ERROR),
            CancelReservation => entry(
                Domain::Inventory,
                "CANCEL_RESERVATION",
                &["RESERVATION_CANCELLED"],
                ERROR,
            ),
            DestroyAsset => entry(Domain::Inventory, "DESTROY", &["DESTROYED"], ERROR),
            CreateAsset => entry(Domain::Asset, "CREATE", &["CREATED"], ERROR),
            DeleteAsset => entry(Domain::Asset, "DELETE", &["DELETED"], ERROR),
            AwardMesos | DeductMesos => {
                entry(Domain::Character, "REQUEST_CHANGE_MESO", &["MESO_CHANGED"], ERROR)
            }
            AwardFame => entry(Domain::Character, "REQUEST_CHANGE_FAME", &["FAME_CHANGED"], ERROR),
            AwardExperience => entry(
                Domain::Character,
                "AWARD_EXPERIENCE",
                &["EXPERIENCE_CHANGED"],
                ERROR,
            ),
            DeductExperience => entry(
                Domain::Character,
                "DEDUCT_EXPERIENCE",
                &["EXPERIENCE_CHANGED"],
                ERROR,
            ),
            AwardLevel => entry(Domain::Character, "AWARD_LEVEL", &["LEVEL_CHANGED"], ERROR),
            ChangeJob => entry(Domain::Character, "CHANGE_JOB", &["JOB_CHANGED"], ERROR),
            WarpToPortal => entry(Domain::Character, "CHANGE_MAP", &["MAP_CHANGED"], ERROR),
            CreateCharacter => entry(
                Domain::Character,
                "CREATE_CHARACTER",
                &["CREATED"],
                &["CREATION_FAILED", "ERROR"],
            ),
            GrantBuff => entry(Domain::Buff, "APPLY", &["APPLIED"], ERROR),
            CancelBuff => entry(Domain::Buff, "CANCEL", &["EXPIRED"], ERROR),
            StartQuest => entry(Domain::Quest, "START", &["STARTED"], ERROR),
            CompleteQuest => entry(Domain::Quest, "COMPLETE", &["COMPLETED"], ERROR),
            ForfeitQuest => entry(Domain::Quest, "FORFEIT", &["FORFEITED"], ERROR),
            CreateSkill => entry(Domain::Skill, "REQUEST_CREATE", &["CREATED"], ERROR),
            UpdateSkill => entry(Domain::Skill, "REQUEST_UPDATE", &["UPDATED"], ERROR),
            SpawnMonster => entry(Domain::Monster, "SPAWN", &["CREATED"], ERROR),
            RequestGuildName => entry(Domain::Guild, "REQUEST_NAME", &["NAME_REQUESTED"], ERROR),
            AcceptToStorage => entry(Domain::Storage, "ACCEPT", &["ACCEPTED"], ERROR),
            ReleaseFromStorage => entry(Domain::Storage, "RELEASE", &["RELEASED"], ERROR),
            AcceptToCashShop => entry(Domain::CashShop, "ACCEPT", &["ACCEPTED"], ERROR),
            ReleaseFromCashShop => entry(Domain::CashShop, "RELEASE", &["RELEASED"], ERROR),
            IncreaseBuddyCapacity => entry(
                Domain::BuddyList,
                "INCREASE_CAPACITY",
                &["CAPACITY_CHANGED"],
                ERROR,
            ),
            GainCloseness => entry(Domain::Pet, "AWARD_CLOSENESS", &["CLOSENESS_CHANGED"], ERROR),
            CreateInvite => entry(Domain::Invite, "CREATE", &["CREATED"], &["REJECTED", "ERROR"]),
            EquipAsset => entry(Domain::Inventory, "EQUIP", &["EQUIPPED"], ERROR),
            UnequipAsset => entry(Domain::Inventory, "UNEQUIP", &["UNEQUIPPED"], ERROR),
            CreateAndEquipAsset => entry(
                Domain::Inventory,
                "CREATE_AND_EQUIP",
                &["CREATED_AND_EQUIPPED"],
                ERROR,
            ),
            DestroyAssetFromSlot => {
                entry(Domain::Inventory, "DESTROY_FROM_SLOT", &["DESTROYED"], ERROR)
            }
            ChangeHair => entry(Domain::Character, "CHANGE_HAIR", &["HAIR_CHANGED"], ERROR),
            ChangeFace => entry(Domain::Character, "CHANGE_FACE", &["FACE_CHANGED"], ERROR),
            ChangeSkin => entry(Domain::Character, "CHANGE_SKIN", &["SKIN_CHANGED"], ERROR),
            ValidateCharacterState => entry(
                Domain::Character,
                "VALIDATE_STATE",
                &["STATE_VALID"],
                &["STATE_INVALID", "ERROR"],
            ),
            AwaitCharacterCreated => {
                awaits(Domain::Character, &["CREATED"], &["CREATION_FAILED", "ERROR"])
            }
            AwardCurrency => {
                entry(Domain::CashShop, "AWARD_CURRENCY", &["CURRENCY_CHANGED"], ERROR)
            }
            WarpToRandomPortal => entry(Domain::Portal, "WARP_TO_RANDOM", &["WARPED"], ERROR),
            CancelAllBuffs => entry(Domain::Buff, "CANCEL_ALL", &["ALL_CANCELLED"], ERROR),
            StartInstanceTransport => entry(
                Domain::Transport,
                "START_INSTANCE",
                &["STARTED"],
                &["START_FAILED", "ERROR"],
            ),
            SpawnReactorDrops => {
                entry(Domain::Drop, "SPAWN_FROM_REACTOR", &["SPAWNED"], ERROR)
            }
            ApplyConsumableEffect => {
                entry(Domain::Consumable, "APPLY_EFFECT", &["EFFECT_APPLIED"], ERROR)
            }
        }
    }
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::ReserveItem(_) => ActionKind::ReserveItem,
            Action::ConsumeItem(_) => ActionKind::ConsumeItem,
            Action::CancelReservation(_) => ActionKind::CancelReservation,
            Action::DestroyAsset(_) => ActionKind::DestroyAsset,
            Action::CreateAsset(_) => ActionKind::CreateAsset,
            Action::DeleteAsset(_) => ActionKind::DeleteAsset,
            Action::AwardMesos(_) => ActionKind::AwardMesos,
            Action::DeductMesos(_) => ActionKind::DeductMesos,
            Action::AwardFame(_) => ActionKind::AwardFame,
            Action::AwardExperience(_) => ActionKind::AwardExperience,
            Action::DeductExperience(_) => ActionKind::DeductExperience,
            Action::AwardLevel(_) => ActionKind::AwardLevel,
            Action::ChangeJob(_) => ActionKind::ChangeJob,
            Action::WarpToPortal(_) => ActionKind::WarpToPortal,
            Action::CreateCharacter(_) => ActionKind::CreateCharacter,
            Action::GrantBuff(_) => ActionKind::GrantBuff,
            Action::CancelBuff(_) => ActionKind::CancelBuff,
            Action::StartQuest(_) => ActionKind::StartQuest,
            Action::CompleteQuest(_) => ActionKind::CompleteQuest,
            Action::ForfeitQuest(_) => ActionKind::ForfeitQuest,
            Action::CreateSkill(_) => ActionKind::CreateSkill,
            Action::UpdateSkill(_) => ActionKind::UpdateSkill,
            Action::SpawnMonster(_) => ActionKind::SpawnMonster,
            Action::RequestGuildName(_) => ActionKind::RequestGuildName,
            Action::AcceptToStorage(_) => ActionKind::AcceptToStorage,
            Action::ReleaseFromStorage(_) => ActionKind::ReleaseFromStorage,
            Action::AcceptToCashShop(_) => ActionKind::AcceptToCashShop,
            Action::ReleaseFromCashShop(_) => ActionKind::ReleaseFromCashShop,
            Action::IncreaseBuddyCapacity(_) => ActionKind::IncreaseBuddyCapacity,
            Action::GainCloseness(_) => ActionKind::GainCloseness,
            Action::CreateInvite(_) => ActionKind::CreateInvite,
            Action::EquipAsset(_) => ActionKind::EquipAsset,
            Action::UnequipAsset(_) => ActionKind::UnequipAsset,
            Action::CreateAndEquipAsset(_) => ActionKind::CreateAndEquipAsset,
            Action::DestroyAssetFromSlot(_) => ActionKind::DestroyAssetFromSlot,
            Action::ChangeHair(_) => ActionKind::ChangeHair,
            Action::ChangeFace(_) => ActionKind::ChangeFace,
            Action::ChangeSkin(_) => ActionKind::ChangeSkin,
            Action::ValidateCharacterState(_) => ActionKind::ValidateCharacterState,
            Action::AwaitCharacterCreated(_) => ActionKind::AwaitCharacterCreated,
            Action::AwardCurrency(_) => ActionKind::AwardCurrency,
            Action::WarpToRandomPortal(_) => ActionKind::WarpToRandomPortal,
            Action::CancelAllBuffs(_) => ActionKind::CancelAllBuffs,
            Action::StartInstanceTransport(_) => ActionKind::StartInstanceTransport,
            Action::SpawnReactorDrops(_) => ActionKind::SpawnReactorDrops,
            Action::ApplyConsumableEffect(_) => ActionKind::ApplyConsumableEffect,
        }
    }

    pub fn contract(&self) -> ActionContract {
        self.kind().contract()
    }

    /// The natural inverse, used as the default compensation.
    ///
    /// Irreversible actions return `None`.
    pub fn inverse(&self) -> Option<Action> {
        let inverse = match self {
            Action::ReserveItem(p) => Action::CancelReservation(CancelReservationPayload {
                character_id: p.character_id,
                template_id: p.template_id,
                quantity: p.quantity,
                reservation_id: None,
            }),
            Action::CreateAsset(p) => Action::DeleteAsset(DeleteAssetPayload {
                character_id: p.character_id,
                template_id: p.template_id,
                asset_id: None,
            }),
            Action::AwardMesos(p) => Action::DeductMesos(p.clone()),
            Action::DeductMesos(p) => Action::AwardMesos(p.clone()),
            Action::AwardExperience(p) => Action::DeductExperience(p.clone()),
            Action::DeductExperience(p) => Action::AwardExperience(p.clone()),
            Action::GrantBuff(p) => Action::CancelBuff(CancelBuffPayload {
                character_id: p.character_id,
                source_id: p.source_id,
            }),
            Action::StartQuest(p) => Action::ForfeitQuest(p.clone()),
            Action::AcceptToStorage(p) => Action::ReleaseFromStorage(p.clone()),
            Action::ReleaseFromStorage(p) => Action::AcceptToStorage(p.clone()),
            Action::AcceptToCashShop(p) => Action::ReleaseFromCashShop(p.clone()),
            Action::ReleaseFromCashShop(p) => Action::AcceptToCashShop(p.clone()),
            Action::EquipAsset(p) => Action::UnequipAsset(p.swapped()),
            Action::UnequipAsset(p) => Action::EquipAsset(p.swapped()),
            Action::CreateAndEquipAsset(p) => {
                Action::DestroyAssetFromSlot(DestroyAssetFromSlotPayload {
                    character_id: p.character_id,
                    inventory_type: EQUIP_INVENTORY,
                    slot: None,
                    quantity: p.quantity,
                })
            }
            Action::ChangeHair(p) => Action::ChangeHair(p.reverted()?),
            Action::ChangeFace(p) => Action::ChangeFace(p.reverted()?),
            Action::ChangeSkin(p) => Action::ChangeSkin(p.reverted()?),
            Action::AwardCurrency(p) => Action::AwardCurrency(CurrencyPayload {
                amount: p.amount.checked_neg()?,
                ..p.clone()
            }),
            _ => return None,
        };
        Some(inverse)
    }

    /// Copies identifiers produced by a completed forward step into this
    /// compensation. Identifiers already set are kept.
    pub fn bind_result(&mut self, result: &Value) {
        match self {
            Action::DeleteAsset(p) if p.asset_id.is_none() => {
                p.asset_id = result
                    .get("assetId")
                    .and_then(Value::as_u64)
                    .and_then(|id| u32::try_from(id).ok());
            }
            Action::DestroyAssetFromSlot(p) if p.slot.is_none() => {
                p.slot = result
                    .get("slot")
                    .and_then(Value::as_i64)
                    .and_then(|slot| i16::try_from(slot).ok());
            }
            Action::CancelReservation(p) if p.reservation_id.is_none() => {
                p.reservation_id = result
                    .get("reservationId")
                    .and_then(Value::as_str)
                    .and_then(|id| Uuid::parse_str(id).ok());
            }
            _ => {}
        }
    }

    /// Builds the command body: the payload fields plus `stepId`.
    pub fn command_body(&self, step_id: &str) -> serde_json::Result<Value> {
        let mut tagged = serde_json::to_value(self)?;
        let mut body = tagged
            .get_mut("payload")
            .map(Value::take)
            .unwrap_or_else(|| Value::Object(Default::default()));

        if let Action::DeductMesos(p) = self {
            body["amount"] = Value::from(-i64::from(p.amount));
        }
        if let Value::Object(ref mut fields) = body {
            fields.insert("stepId".to_string(), Value::from(step_id));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use serde_json::json;

    use super::*;

    #[test]
    fn every_action_has_a_total_outcome_table() {
        for kind in ActionKind::ALL {
            let contract = kind.contract();
            assert!(contract.command_type.is_none_or(|t| !t.is_empty()), "{kind:?}");
            assert!(!contract.success.is_empty(), "{kind:?}");
            assert!(!contract.failure.is_empty(), "{kind:?}");
            for success in contract.success {
                assert!(!contract.failure.contains(success), "{kind:?} overlaps on {success}");
            }
            assert_eq!(kind.contract(), contract, "table must be deterministic");
        }
    }

    #[test]
    fn every_domain_has_distinct_topics() {
        let mut topics = HashSet::new();
        for domain in Domain::ALL {
            assert!(topics.insert(domain.command_topic()));
            assert!(topics.insert(domain.status_topic()));
        }
    }

    #[test]
    fn wire_shape_is_snake_case_tag_with_camel_case_payload() {
        let action = Action::ReserveItem(ReserveItemPayload {
            character_id: 100,
            template_id: 2000000,
            quantity: 1,
        });

        let value = serde_json::to_value(&action).unwrap();
        assert_eq!(
            value,
            json!({"type": "reserve_item", "payload": {"characterId": 100, "templateId": 2000000, "quantity": 1}})
        );
        assert_eq!(serde_json::from_value::<Action>(value).unwrap(), action);
    }

    #[test]
    fn inverses_pair_up() {
        let award = Action::AwardMesos(MesoPayload {
            character_id: 1,
            world_id: 0,
            amount: 500,
        });
        let deduct = award.inverse().unwrap();
        assert_eq!(deduct.kind(), ActionKind::DeductMesos);
        assert_eq!(deduct.inverse(), Some(award));

        let fame = Action::AwardFame(FamePayload {
            character_id: 1,
            world_id: 0,
            amount: 1,
        });
        assert_eq!(fame.inverse(), None);
    }

    #[test]
    fn bind_result_fills_missing_asset_id() {
        let create = Action::CreateAsset(CreateAssetPayload {
            character_id: 100,
            template_id: 1302000,
            quantity: 1,
            expiration: None,
        });
        let mut delete = create.inverse().unwrap();
        delete.bind_result(&json!({"assetId": 77}));

        match delete {
            Action::DeleteAsset(p) => assert_eq!(p.asset_id, Some(77)),
            other => panic!("unexpected inverse {other:?}"),
        }
    }

    #[test]
    fn deduct_mesos_goes_out_negative_with_step_id() {
        let deduct = Action::DeductMesos(MesoPayload {
            character_id: 100,
            world_id: 0,
            amount: 250,
        });

        let body = deduct.command_body("step_2").unwrap();
        assert_eq!(body["amount"], -250);
        assert_eq!(body["characterId"], 100);
        assert_eq!(body["stepId"], "step_2");
    }

    #[test]
    fn classify_distinguishes_success_failure_and_foreign_types() {
        let contract = ActionKind::CreateCharacter.contract();
        assert_eq!(contract.classify("CREATED"), Some(Outcome::Success));
        assert_eq!(contract.classify("CREATION_FAILED"), Some(Outcome::Failure));
        assert_eq!(contract.classify("DELETED"), None);
    }

    #[test]
    fn every_domain_is_served_by_some_action() {
        let kinds: HashSet<_> = ActionKind::ALL.iter().collect();
        assert_eq!(kinds.len(), ActionKind::ALL.len());

        let served: HashSet<_> = ActionKind::ALL.iter().map(|k| k.contract().domain).collect();
        for domain in Domain::ALL {
            assert!(served.contains(&domain), "{domain:?}");
        }
    }

    #[test]
    fn new_domains_route_to_their_own_topics() {
        let transport = ActionKind::StartInstanceTransport.contract();
        assert_eq!(transport.domain.command_topic(), "COMMAND_TOPIC_TRANSPORT");
        assert_eq!(transport.classify("START_FAILED"), Some(Outcome::Failure));

        let drops = ActionKind::SpawnReactorDrops.contract();
        assert_eq!(drops.domain.status_topic(), "EVENT_TOPIC_DROP_STATUS");
        assert_eq!(drops.classify("SPAWNED"), Some(Outcome::Success));

        assert_eq!(
            ActionKind::WarpToRandomPortal.contract().domain.command_topic(),
            "COMMAND_TOPIC_PORTAL"
        );
        assert_eq!(
            ActionKind::ApplyConsumableEffect.contract().domain.command_topic(),
            "COMMAND_TOPIC_CONSUMABLE"
        );
    }

    #[test]
    fn awaiting_character_creation_sends_nothing() {
        let contract = ActionKind::AwaitCharacterCreated.contract();
        assert!(!contract.sends_command());
        assert_eq!(contract.domain, Domain::Character);
        assert_eq!(contract.classify("CREATED"), Some(Outcome::Success));
        assert!(ActionKind::CreateCharacter.contract().sends_command());
    }

    #[test]
    fn equip_and_unequip_swap_slots() {
        let equip = Action::EquipAsset(EquipmentMovePayload {
            character_id: 100,
            inventory_type: 1,
            source: 4,
            destination: -11,
        });

        let unequip = equip.inverse().unwrap();
        match &unequip {
            Action::UnequipAsset(p) => {
                assert_eq!(p.source, -11);
                assert_eq!(p.destination, 4);
            }
            other => panic!("unexpected inverse {other:?}"),
        }
        assert_eq!(unequip.inverse(), Some(equip));
    }

    #[test]
    fn style_changes_revert_only_when_previous_style_is_known() {
        let hair = StylePayload {
            character_id: 100,
            world_id: 0,
            channel_id: 1,
            style_id: 30030,
            previous_style_id: None,
        };
        assert_eq!(Action::ChangeHair(hair.clone()).inverse(), None);

        let known = StylePayload {
            previous_style_id: Some(30000),
            ..hair
        };
        match Action::ChangeFace(known).inverse() {
            Some(Action::ChangeFace(p)) => {
                assert_eq!(p.style_id, 30000);
                assert_eq!(p.previous_style_id, Some(30030));
            }
            other => panic!("unexpected inverse {other:?}"),
        }
    }

    #[test]
    fn currency_award_is_undone_by_the_negated_amount() {
        let award = Action::AwardCurrency(CurrencyPayload {
            character_id: 100,
            account_id: 7,
            currency_type: 1,
            amount: 300,
        });
        match award.inverse() {
            Some(Action::AwardCurrency(p)) => assert_eq!(p.amount, -300),
            other => panic!("unexpected inverse {other:?}"),
        }

        let unbounded = Action::AwardCurrency(CurrencyPayload {
            character_id: 100,
            account_id: 7,
            currency_type: 1,
            amount: i32::MIN,
        });
        assert_eq!(unbounded.inverse(), None);
    }

    #[test]
    fn irreversible_new_actions_have_no_inverse() {
        let cancel_all = Action::CancelAllBuffs(CancelAllBuffsPayload {
            character_id: 100,
            world_id: 0,
            channel_id: 1,
            map_id: 100000000,
        });
        let random_warp = Action::WarpToRandomPortal(RandomPortalPayload {
            character_id: 100,
            world_id: 0,
            channel_id: 1,
            map_id: 100000000,
        });
        assert_eq!(cancel_all.inverse(), None);
        assert_eq!(random_warp.inverse(), None);
    }

    #[test]
    fn validation_conditions_keep_their_wire_shape() {
        let value = json!({
            "type": "validate_character_state",
            "payload": {
                "characterId": 100,
                "conditions": [{"conditionType": "level", "operator": ">=", "value": 10}]
            }
        });

        let action: Action = serde_json::from_value(value).unwrap();
        let Action::ValidateCharacterState(p) = &action else {
            panic!("unexpected action {action:?}");
        };
        assert_eq!(p.conditions[0].condition_type, "level");
        assert_eq!(p.conditions[0].reference_id, None);

        let body = action.command_body("step_1").unwrap();
        assert_eq!(body["conditions"][0]["operator"], ">=");
        assert_eq!(body["stepId"], "step_1");
    }
}
