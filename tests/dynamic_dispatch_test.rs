use bankcore::domain::account::{Account, AccountNumber, Amount};
use bankcore::domain::otp::OtpInfo;
use bankcore::domain::ports::{
    CacheStore, CacheStoreRef, LedgerStore, LedgerStoreRef, LedgerUnit, OtpStore, OtpStoreRef,
};
use bankcore::domain::transaction::Transaction;
use bankcore::domain::user::UserId;
use bankcore::infrastructure::cache::{FallbackCache, LocalCache};
use bankcore::infrastructure::in_memory::{InMemoryLedgerStore, InMemoryOtpStore};
use chrono::Utc;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_stores_as_trait_objects() {
    let ledger: LedgerStoreRef = Arc::new(InMemoryLedgerStore::new());
    let otps: OtpStoreRef = Arc::new(InMemoryOtpStore::new());
    let cache: CacheStoreRef = Arc::new(FallbackCache::local_only(LocalCache::new(
        16,
        Duration::from_secs(60),
    )));

    let number = AccountNumber::new("abc123");
    ledger
        .insert_account(Account::new(number.clone(), UserId::generate()))
        .await
        .unwrap();

    // Verify Send + Sync by spawning tasks
    let ledger_handle = {
        let ledger = Arc::clone(&ledger);
        let number = number.clone();
        tokio::spawn(async move {
            let mut unit = ledger.begin(&[number.clone()]).await.unwrap();
            let mut account = unit.account(&number).cloned().unwrap();
            let amount = Amount::new(dec!(500)).unwrap();
            account.deposit(amount);
            unit.stage_account(account);
            unit.stage_transaction(Transaction::deposit(number.clone(), amount, Utc::now()));
            unit.commit().await.unwrap();
            ledger.find_account(&number).await.unwrap().unwrap()
        })
    };

    let otp_handle = {
        let number = number.clone();
        tokio::spawn(async move {
            otps.save(OtpInfo::issue(number.clone(), Utc::now()))
                .await
                .unwrap();
            otps.find(&number).await.unwrap().unwrap()
        })
    };

    let cache_handle = tokio::spawn(async move {
        cache.put("k", "v", None).await.unwrap();
        cache.get("k").await.unwrap()
    });

    assert_eq!(ledger_handle.await.unwrap().balance.value(), dec!(500));
    assert_eq!(otp_handle.await.unwrap().account, number);
    assert_eq!(cache_handle.await.unwrap().as_deref(), Some("v"));
    assert_eq!(ledger.transactions_for(&number).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_dropped_unit_rolls_back() {
    let ledger: LedgerStoreRef = Arc::new(InMemoryLedgerStore::new());
    let number = AccountNumber::new("abc123");
    ledger
        .insert_account(Account::new(number.clone(), UserId::generate()))
        .await
        .unwrap();

    {
        let mut unit = ledger.begin(&[number.clone()]).await.unwrap();
        let mut account = unit.account(&number).cloned().unwrap();
        account.deposit(Amount::new(dec!(100)).unwrap());
        unit.stage_account(account);
    }

    let account = ledger.find_account(&number).await.unwrap().unwrap();
    assert_eq!(account.balance.value(), dec!(0));
    // The row lock was released with the unit.
    ledger.begin(&[number]).await.unwrap();
}
