mod common;

use common::*;
use eskit::crypto::{content_iv, decrypt_cbc, sha1};
use eskit::error::{ES_EINVAL, FS_ENOENT, IPC_SUCCESS};
use eskit::es::Es;
use eskit::ipc::{EsCommand, Ioctlv};
use eskit::keys::DEFAULT_DEVICE_ID;

fn call(es: &mut Es, command: EsCommand, ins: Vec<Vec<u8>>, ios: Vec<Vec<u8>>) -> (i32, Ioctlv) {
    let mut request = Ioctlv::new(ins, ios);
    let code = es.ioctlv(command as u32, &mut request);
    (code, request)
}

fn u32_at(buf: &[u8], index: usize) -> u32 {
    u32::from_be_bytes(buf[index * 4..index * 4 + 4].try_into().unwrap())
}

fn install_over_ipc(es: &mut Es, title_id: u64, contents: &[TestContent]) {
    let (code, _) = call(
        es,
        EsCommand::AddTicket,
        vec![ticket(title_id, &TITLE_KEY), vec![], vec![]],
        vec![],
    );
    assert_eq!(code, IPC_SUCCESS);
    let (code, _) = call(
        es,
        EsCommand::AddTitleStart,
        vec![raw_tmd(title_id, contents), vec![], vec![], vec![]],
        vec![],
    );
    assert_eq!(code, IPC_SUCCESS);

    for content in contents {
        let (fd, _) = call(
            es,
            EsCommand::AddContentStart,
            vec![title_id.to_be_bytes().to_vec(), content.id.to_be_bytes().to_vec()],
            vec![],
        );
        assert_eq!(fd, 0);
        let fd = (fd as u32).to_be_bytes().to_vec();
        for chunk in content.encrypted(&TITLE_KEY).chunks(0x20) {
            let ins = vec![fd.clone(), chunk.to_vec()];
            let (code, _) = call(es, EsCommand::AddContentData, ins, vec![]);
            assert_eq!(code, IPC_SUCCESS);
        }
        let (code, _) = call(es, EsCommand::AddContentFinish, vec![fd], vec![]);
        assert_eq!(code, IPC_SUCCESS);
    }

    let (code, _) = call(es, EsCommand::AddTitleFinish, vec![], vec![]);
    assert_eq!(code, IPC_SUCCESS);
}

#[test]
fn import_and_export_over_ioctlv() {
    let (_dir, mut es) = setup();
    let contents = [
        TestContent::private(5, 0, pattern(90, 31)),
        TestContent::shared(6, 1, pattern(40, 32)),
    ];
    install_over_ipc(&mut es, TITLE_ID, &contents);

    let (code, req) = call(&mut es, EsCommand::GetTitleCount, vec![], vec![vec![0; 4]]);
    assert_eq!(code, IPC_SUCCESS);
    assert_eq!(u32_at(&req.io_vectors[0], 0), 1);
    let (code, req) = call(
        &mut es,
        EsCommand::GetTitles,
        vec![1u32.to_be_bytes().to_vec()],
        vec![vec![0; 8]],
    );
    assert_eq!(code, IPC_SUCCESS);
    assert_eq!(req.io_vectors[0], TITLE_ID.to_be_bytes());

    let raw = raw_tmd(TITLE_ID, &contents);
    let tid = TITLE_ID.to_be_bytes().to_vec();
    let (code, req) = call(
        &mut es,
        EsCommand::ExportTitleInit,
        vec![tid.clone()],
        vec![vec![0; raw.len()]],
    );
    assert_eq!(code, IPC_SUCCESS);
    assert_eq!(req.io_vectors[0], raw);

    for content in &contents {
        let (handle, _) = call(
            &mut es,
            EsCommand::ExportContentBegin,
            vec![tid.clone(), content.id.to_be_bytes().to_vec()],
            vec![],
        );
        assert!(handle >= 0);
        let handle = (handle as u32).to_be_bytes().to_vec();
        let (code, req) = call(
            &mut es,
            EsCommand::ExportContentData,
            vec![handle.clone()],
            vec![vec![0; 0x60]],
        );
        assert_eq!(code, IPC_SUCCESS);

        let iv = content_iv(content.index);
        let plaintext = decrypt_cbc(&TITLE_KEY, &iv, &req.io_vectors[0]).unwrap();
        assert_eq!(&plaintext[..content.data.len()], content.data.as_slice());

        let (code, _) = call(&mut es, EsCommand::ExportContentEnd, vec![handle], vec![]);
        assert_eq!(code, IPC_SUCCESS);
    }
    let (code, _) = call(&mut es, EsCommand::ExportTitleDone, vec![], vec![]);
    assert_eq!(code, IPC_SUCCESS);
}

#[test]
fn malformed_requests_have_no_side_effects() {
    let (dir, mut es) = setup();

    let (code, _) = call(&mut es, EsCommand::AddTicket, vec![ticket(TITLE_ID, &TITLE_KEY)], vec![]);
    assert_eq!(code, ES_EINVAL);
    assert!(!paths(&dir).ticket(TITLE_ID).exists());

    let (code, _) = call(&mut es, EsCommand::AddTmd, vec![raw_tmd(TITLE_ID, &[]), vec![]], vec![]);
    assert_eq!(code, ES_EINVAL);
    assert!(es.import_session().staged_tmd().is_none());

    let (code, _) = call(&mut es, EsCommand::DeleteTitle, vec![vec![0; 4]], vec![]);
    assert_eq!(code, ES_EINVAL);

    let mut request = Ioctlv::default();
    assert_eq!(es.ioctlv(0x99, &mut request), ES_EINVAL);
}

#[test]
fn delete_title_protects_system_titles() {
    let (dir, mut es) = setup();
    let system_menu = 0x0000_0001_0000_0002u64;
    install_over_ipc(&mut es, system_menu, &[TestContent::private(1, 0, pattern(16, 40))]);
    install_over_ipc(&mut es, TITLE_ID, &[TestContent::private(1, 0, pattern(16, 41))]);

    let menu_tid = system_menu.to_be_bytes().to_vec();
    let (code, _) = call(&mut es, EsCommand::DeleteTitle, vec![menu_tid], vec![]);
    assert_eq!(code, ES_EINVAL);
    assert!(paths(&dir).title_dir(system_menu).is_dir());

    let tid = TITLE_ID.to_be_bytes().to_vec();
    let (code, _) = call(&mut es, EsCommand::DeleteTitle, vec![tid.clone()], vec![]);
    assert_eq!(code, IPC_SUCCESS);
    assert!(!paths(&dir).title_dir(TITLE_ID).exists());

    let (code, _) = call(&mut es, EsCommand::DeleteTitle, vec![tid], vec![]);
    assert_eq!(code, FS_ENOENT);
}

#[test]
fn delete_ticket_and_title_content() {
    let (dir, mut es) = setup();
    install_over_ipc(&mut es, TITLE_ID, &[TestContent::private(2, 0, pattern(48, 50))]);
    let tid = TITLE_ID.to_be_bytes().to_vec();

    let (code, _) = call(&mut es, EsCommand::DeleteTitleContent, vec![tid.clone()], vec![]);
    assert_eq!(code, IPC_SUCCESS);
    assert!(!paths(&dir).title_content(TITLE_ID, 2).exists());
    assert!(paths(&dir).tmd(TITLE_ID).exists());

    let (code, _) = call(&mut es, EsCommand::DeleteTicket, vec![tid.clone()], vec![]);
    assert_eq!(code, IPC_SUCCESS);
    let (code, _) = call(&mut es, EsCommand::DeleteTicket, vec![tid], vec![]);
    assert_eq!(code, ES_EINVAL);

    let other = OTHER_TITLE_ID.to_be_bytes().to_vec();
    let (code, _) = call(&mut es, EsCommand::DeleteTitleContent, vec![other], vec![]);
    assert_eq!(code, ES_EINVAL);
}

#[test]
fn content_queries() {
    let (_dir, mut es) = setup();
    let shared = pattern(32, 60);
    let contents = [
        TestContent::private(7, 0, pattern(32, 61)),
        TestContent::shared(8, 1, shared.clone()),
    ];
    install_over_ipc(&mut es, TITLE_ID, &contents);

    let tid = TITLE_ID.to_be_bytes().to_vec();
    let (code, req) = call(
        &mut es,
        EsCommand::GetTitleContentCount,
        vec![tid.clone()],
        vec![vec![0; 4]],
    );
    assert_eq!(code, IPC_SUCCESS);
    assert_eq!(u32_at(&req.io_vectors[0], 0), 2);

    let (code, req) = call(
        &mut es,
        EsCommand::GetTitleContents,
        vec![tid, 2u32.to_be_bytes().to_vec()],
        vec![vec![0; 8]],
    );
    assert_eq!(code, IPC_SUCCESS);
    assert_eq!((u32_at(&req.io_vectors[0], 0), u32_at(&req.io_vectors[0], 1)), (7, 8));

    let (code, req) = call(
        &mut es,
        EsCommand::GetStoredContentCount,
        vec![raw_tmd(TITLE_ID, &contents)],
        vec![vec![0; 4]],
    );
    assert_eq!(code, IPC_SUCCESS);
    assert_eq!(u32_at(&req.io_vectors[0], 0), 2);

    let (code, _) = call(
        &mut es,
        EsCommand::GetStoredContents,
        vec![raw_tmd(TITLE_ID, &contents), 2u32.to_be_bytes().to_vec()],
        vec![vec![0; 4]],
    );
    assert_eq!(code, ES_EINVAL);

    let (code, req) = call(&mut es, EsCommand::GetSharedContentCount, vec![], vec![vec![0; 4]]);
    assert_eq!(code, IPC_SUCCESS);
    assert_eq!(u32_at(&req.io_vectors[0], 0), 1);
    let (code, req) = call(
        &mut es,
        EsCommand::GetSharedContents,
        vec![1u32.to_be_bytes().to_vec()],
        vec![vec![0; 20]],
    );
    assert_eq!(code, IPC_SUCCESS);
    assert_eq!(req.io_vectors[0], sha1(&shared));

    let (code, req) = call(&mut es, EsCommand::GetDeviceId, vec![], vec![vec![0xff; 4]]);
    assert_eq!(code, IPC_SUCCESS);
    assert_eq!(u32_at(&req.io_vectors[0], 0), DEFAULT_DEVICE_ID);
}
